//! Drishti EO - electro-optical camera tracking node
//!
//! Tracks a target through a camera and reports its bearing to consumers,
//! while accepting remote commands that toggle video streaming and display.
//!
//! ## Channels
//!
//! - **TCP telemetry (port 3456)**: [`streaming::TelemetryServer`] fans JSON
//!   bearing records out to every connected client
//! - **UDP commands (port 2468)**: [`streaming::CommandListener`] decodes
//!   5-byte frames into [`state::SharedFlags`]
//!
//! [`tracker::ControlLoop`] waits for a telemetry client, then reads,
//! processes and publishes frames at the configured rate.

pub mod config;
pub mod core;
pub mod devices;
pub mod error;
pub mod state;
pub mod streaming;
pub mod tracker;
pub mod tracking;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Error, Result};
