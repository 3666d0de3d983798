//! Session state machine
//!
//! ```text
//!                  client connected
//!  AwaitingClient ─────────────────▶ Streaming
//!        │  ▲                          │
//!        │  └──── last client left ────┤ (wait_for_reconnect)
//!        │                             │
//!        └──────────▶ Closed ◀─────────┘
//!   stop / camera closed      stop / camera closed or failed /
//!                             last client left
//! ```
//!
//! Every frame read while streaming is processed so the detector sees full
//! motion. Telemetry leaves at most once per publish interval, measured on a
//! monotonic clock; the first frame of a streaming session publishes
//! immediately. A failed broadcast to one client is the server's concern and
//! never ends the session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use super::TelemetrySink;
use crate::config::AppConfig;
use crate::core::pipeline::{FrameProcessor, FrameSink, FrameSource};
use crate::core::types::Frame;
use crate::state::SharedFlags;
use crate::streaming::messages::TelemetryRecord;
use crate::streaming::wire::encode_telemetry;

/// Longest single sleep while idle, so a stop request is seen promptly
const IDLE_SLICE: Duration = Duration::from_millis(50);

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingClient,
    Streaming,
    Closed,
}

/// Why the session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Frame source reported closed
    CameraClosed,
    /// A frame read failed; the camera is assumed disconnected
    CameraReadFailed,
    /// Every telemetry client left
    ClientsDisconnected,
    /// External stop request
    Stopped,
}

/// Control loop tuning
#[derive(Debug, Clone)]
pub struct ControlLoopConfig {
    /// Minimum gap between telemetry broadcasts
    pub publish_interval: Duration,
    /// Poll interval while no client is connected
    pub client_poll_interval: Duration,
    /// Downscale factor applied before processing
    pub scale_divisor: u32,
    /// Show every frame regardless of the remote display flag
    pub display: bool,
    /// Go back to waiting when the last client leaves
    pub wait_for_reconnect: bool,
}

impl ControlLoopConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            publish_interval: config.tracking.publish_interval(),
            client_poll_interval: config.tracking.client_poll_interval(),
            scale_divisor: config.camera.scale_divisor,
            display: config.tracking.display,
            wait_for_reconnect: config.tracking.wait_for_reconnect,
        }
    }
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

/// Outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames_processed: u64,
    pub records_published: u64,
    /// Number of times the loop entered `Streaming`
    pub streaming_sessions: u64,
    pub close_reason: CloseReason,
}

/// Capture/publish control loop
///
/// Owns the frame source and every frame sink exclusively. They are released
/// exactly once, when the loop reaches `Closed` or when it is dropped.
pub struct ControlLoop {
    config: ControlLoopConfig,
    source: Box<dyn FrameSource>,
    processor: Box<dyn FrameProcessor>,
    display: Option<Box<dyn FrameSink>>,
    recorder: Option<Box<dyn FrameSink>>,
    streamer: Option<Box<dyn FrameSink>>,
    flags: SharedFlags,
    running: Arc<AtomicBool>,
    state: SessionState,
    last_send: Option<Instant>,
    frames_processed: u64,
    records_published: u64,
    streaming_sessions: u64,
    released: bool,
}

impl ControlLoop {
    pub fn new(
        config: ControlLoopConfig,
        source: Box<dyn FrameSource>,
        processor: Box<dyn FrameProcessor>,
        flags: SharedFlags,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            source,
            processor,
            display: None,
            recorder: None,
            streamer: None,
            flags,
            running,
            state: SessionState::AwaitingClient,
            last_send: None,
            frames_processed: 0,
            records_published: 0,
            streaming_sessions: 0,
            released: false,
        }
    }

    /// Sink shown when display is configured or remotely enabled
    pub fn with_display(mut self, sink: Box<dyn FrameSink>) -> Self {
        self.display = Some(sink);
        self
    }

    /// Sink receiving every processed frame
    pub fn with_recorder(mut self, sink: Box<dyn FrameSink>) -> Self {
        self.recorder = Some(sink);
        self
    }

    /// Sink fed while the remote stream flag is enabled
    pub fn with_streamer(mut self, sink: Box<dyn FrameSink>) -> Self {
        self.streamer = Some(sink);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run until the session closes
    pub fn run(&mut self, telemetry: &dyn TelemetrySink) -> SessionSummary {
        log::info!(
            "Control loop started (publish every {:?})",
            self.config.publish_interval
        );

        let reason = loop {
            if !self.running.load(Ordering::SeqCst) {
                break CloseReason::Stopped;
            }
            if !self.source.is_open() {
                break CloseReason::CameraClosed;
            }

            match self.state {
                SessionState::AwaitingClient => {
                    if telemetry.connection_count() > 0 {
                        self.enter_streaming(telemetry.connection_count());
                    } else {
                        self.idle(self.config.client_poll_interval);
                    }
                }
                SessionState::Streaming => {
                    if telemetry.connection_count() == 0 {
                        if self.config.wait_for_reconnect {
                            log::info!("All telemetry clients disconnected; waiting for a new one");
                            self.state = SessionState::AwaitingClient;
                            continue;
                        }
                        log::info!("All telemetry clients disconnected");
                        break CloseReason::ClientsDisconnected;
                    }

                    let frame = match self.source.read_frame() {
                        Ok(frame) => frame,
                        Err(e) => {
                            log::error!("Frame read failed: {}", e);
                            break CloseReason::CameraReadFailed;
                        }
                    };
                    self.step(frame, telemetry);
                }
                // Not reachable from inside the loop
                SessionState::Closed => break CloseReason::Stopped,
            }
        };

        self.state = SessionState::Closed;
        self.release();

        let summary = SessionSummary {
            frames_processed: self.frames_processed,
            records_published: self.records_published,
            streaming_sessions: self.streaming_sessions,
            close_reason: reason,
        };
        log::info!(
            "Session closed ({:?}): {} frames processed, {} records published",
            reason,
            summary.frames_processed,
            summary.records_published
        );
        summary
    }

    fn enter_streaming(&mut self, clients: usize) {
        log::info!("{} telemetry client(s) connected; streaming", clients);
        self.state = SessionState::Streaming;
        self.streaming_sessions += 1;
        self.last_send = None;
    }

    /// Process one frame and publish if the interval has elapsed
    fn step(&mut self, frame: Frame, telemetry: &dyn TelemetrySink) {
        let frame = frame.downscale(self.config.scale_divisor);
        let bearing = self.processor.process(&frame);
        self.frames_processed += 1;

        let now = Instant::now();
        let due = self
            .last_send
            .is_none_or(|last| now.duration_since(last) >= self.config.publish_interval);
        if due {
            let record = TelemetryRecord::now(bearing);
            match encode_telemetry(&record) {
                Ok(payload) => {
                    let delivered = telemetry.broadcast(&payload);
                    self.records_published += 1;
                    log::trace!(
                        "Published frame {} to {} client(s): {:?}",
                        frame.sequence,
                        delivered,
                        record
                    );
                }
                Err(e) => log::warn!("Failed to encode telemetry: {}", e),
            }
            // Updated on every attempt, successful or not
            self.last_send = Some(now);
        }

        let flags = self.flags.snapshot();
        if self.config.display || flags.display_enabled {
            write_sink(&mut self.display, &frame);
        }
        write_sink(&mut self.recorder, &frame);
        if flags.stream_enabled {
            write_sink(&mut self.streamer, &frame);
        }
    }

    /// Sleep for up to `duration`, returning early on a stop request
    fn idle(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            let now = Instant::now();
            if now >= deadline || !self.running.load(Ordering::SeqCst) {
                return;
            }
            thread::sleep((deadline - now).min(IDLE_SLICE));
        }
    }

    /// Release camera and outputs; later calls do nothing
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        self.source.release();
        for sink in [&mut self.display, &mut self.recorder, &mut self.streamer]
            .into_iter()
            .flatten()
        {
            if let Err(e) = sink.release() {
                log::warn!("Failed to release {} output: {}", sink.name(), e);
            }
        }
        log::debug!("Control loop resources released");
    }
}

impl Drop for ControlLoop {
    fn drop(&mut self) {
        self.release();
    }
}

fn write_sink(sink: &mut Option<Box<dyn FrameSink>>, frame: &Frame) {
    if let Some(sink) = sink {
        if let Err(e) = sink.write(frame) {
            log::warn!("{} output failed on frame {}: {}", sink.name(), frame.sequence, e);
        }
    }
}
