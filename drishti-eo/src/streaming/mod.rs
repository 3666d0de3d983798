//! Network channels for Drishti EO
//!
//! - **TCP telemetry (port 3456)**: JSON bearing records fanned out to every
//!   connected consumer
//! - **UDP commands (port 2468)**: 5-byte frames toggling stream/display flags
//! - **UDP video (optional)**: chunked frames to a single viewer

pub mod command_listener;
pub mod frame_streamer;
pub mod messages;
pub mod telemetry_server;
pub mod wire;

pub use command_listener::{CommandListener, ListenerStats};
pub use frame_streamer::UdpFrameStreamer;
pub use messages::TelemetryRecord;
pub use telemetry_server::{ServerOptions, ServerStats, TelemetryServer};
pub use wire::{Command, FrameError, TelemetryDecoder, encode_command, parse_command};
