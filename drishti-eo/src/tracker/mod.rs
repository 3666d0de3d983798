//! Capture/publish session
//!
//! The [`ControlLoop`] ties the camera, the frame processor and the telemetry
//! server together. It talks to the server through [`TelemetrySink`] so the
//! session logic can be exercised without sockets.

mod control_loop;

pub use control_loop::{CloseReason, ControlLoop, ControlLoopConfig, SessionState, SessionSummary};

use crate::streaming::TelemetryServer;

/// Outbound telemetry channel as seen by the control loop
pub trait TelemetrySink {
    /// Number of currently connected consumers
    fn connection_count(&self) -> usize;

    /// Send one payload to every consumer; returns how many received it
    fn broadcast(&self, payload: &[u8]) -> usize;
}

impl TelemetrySink for TelemetryServer {
    fn connection_count(&self) -> usize {
        TelemetryServer::connection_count(self)
    }

    fn broadcast(&self, payload: &[u8]) -> usize {
        TelemetryServer::broadcast(self, payload)
    }
}
