//! Wire formats for both network channels
//!
//! # UDP Command Frame
//!
//! Commands are fixed 5-byte datagrams with no dynamic-length fields:
//!
//! ```text
//! ┌───────┬───────┬────────┬────────────┬──────┐
//! │ SYNC1 │ SYNC2 │ MSG_ID │ COMMAND_ID │ EOB  │
//! │ 0xA5  │ 0xE1  │ 0x01   │ 0x01-0x04  │ 0xCB │
//! └───────┴───────┴────────┴────────────┴──────┘
//! ```
//!
//! A frame is valid iff it is exactly 5 bytes long and the sync and
//! end-of-block bytes match. No acknowledgement is ever sent back.
//!
//! | COMMAND_ID | Command |
//! |------------|---------|
//! | `0x01` | Enable stream |
//! | `0x02` | Disable stream |
//! | `0x03` | Enable display |
//! | `0x04` | Disable display |
//!
//! # TCP Telemetry
//!
//! Each record is one UTF-8 JSON object, written with a single write and
//! concatenated directly on the stream (no length prefix, no delimiter):
//!
//! ```text
//! {"timestamp":43212.345678,"azimuth":-1.23,"elevation":0.98,"distance":0.0}
//! ```
//!
//! TCP may still split or merge objects on the consumer side, so consumers
//! should feed reads through [`TelemetryDecoder`] rather than parse each read.

use crate::error::{Error, Result};
use crate::streaming::messages::TelemetryRecord;

/// First sync byte
pub const SYNC1: u8 = 0xA5;
/// Second sync byte
pub const SYNC2: u8 = 0xE1;
/// The only recognised message class
pub const COMMAND_MSG_ID: u8 = 0x01;
/// End-of-block marker
pub const EOB: u8 = 0xCB;
/// Exact command frame length
pub const COMMAND_FRAME_LEN: usize = 5;

/// Remote command carried in a command frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    EnableStream = 0x01,
    DisableStream = 0x02,
    EnableDisplay = 0x03,
    DisableDisplay = 0x04,
}

impl Command {
    /// Decode a COMMAND_ID byte
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0x01 => Some(Command::EnableStream),
            0x02 => Some(Command::DisableStream),
            0x03 => Some(Command::EnableDisplay),
            0x04 => Some(Command::DisableDisplay),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Command-line name, e.g. `enable-stream`
    pub fn name(self) -> &'static str {
        match self {
            Command::EnableStream => "enable-stream",
            Command::DisableStream => "disable-stream",
            Command::EnableDisplay => "enable-display",
            Command::DisableDisplay => "disable-display",
        }
    }
}

impl std::str::FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        [
            Command::EnableStream,
            Command::DisableStream,
            Command::EnableDisplay,
            Command::DisableDisplay,
        ]
        .into_iter()
        .find(|command| command.name() == s)
        .ok_or_else(|| Error::InvalidParameter(format!("unknown command '{}'", s)))
    }
}

/// Why a datagram was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("invalid length: {0} bytes")]
    InvalidLength(usize),

    #[error("bad sync bytes: {0:#04x} {1:#04x}")]
    BadSync(u8, u8),

    #[error("bad end-of-block byte: {0:#04x}")]
    BadEndOfBlock(u8),

    #[error("unknown message id: {0:#04x}")]
    UnknownMessage(u8),

    #[error("unrecognized command: {0:#04x}")]
    UnknownCommand(u8),
}

/// Validate and decode a command datagram
pub fn parse_command(bytes: &[u8]) -> std::result::Result<Command, FrameError> {
    let [sync1, sync2, msg_id, command_id, eob] = *bytes else {
        return Err(FrameError::InvalidLength(bytes.len()));
    };

    if sync1 != SYNC1 || sync2 != SYNC2 {
        return Err(FrameError::BadSync(sync1, sync2));
    }
    if eob != EOB {
        return Err(FrameError::BadEndOfBlock(eob));
    }
    if msg_id != COMMAND_MSG_ID {
        return Err(FrameError::UnknownMessage(msg_id));
    }

    Command::from_id(command_id).ok_or(FrameError::UnknownCommand(command_id))
}

/// Encode a command into its 5-byte frame
pub fn encode_command(command: Command) -> [u8; COMMAND_FRAME_LEN] {
    [SYNC1, SYNC2, COMMAND_MSG_ID, command.id(), EOB]
}

/// Serialize a telemetry record to its JSON wire form
pub fn encode_telemetry(record: &TelemetryRecord) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(record)?)
}

/// Largest partial record kept while waiting for more bytes
pub const MAX_PENDING_BYTES: usize = 4096;

/// Incremental decoder for the undelimited telemetry stream
///
/// Feed it whatever each socket read returns; it yields every complete
/// record and keeps any trailing partial object for the next call.
/// Corrupt input is discarded up to the end of the current buffer, and so is
/// a partial object that grows past [`MAX_PENDING_BYTES`].
#[derive(Debug, Default)]
pub struct TelemetryDecoder {
    buffer: Vec<u8>,
    discarded_bytes: u64,
}

impl TelemetryDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return all records completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<TelemetryRecord> {
        self.buffer.extend_from_slice(chunk);

        let mut records = Vec::new();
        let mut consumed = 0;
        let mut corrupt = false;
        {
            let mut stream =
                serde_json::Deserializer::from_slice(&self.buffer).into_iter::<TelemetryRecord>();
            loop {
                match stream.next() {
                    Some(Ok(record)) => {
                        records.push(record);
                        consumed = stream.byte_offset();
                    }
                    // Partial object at the end; wait for more bytes
                    Some(Err(e)) if e.is_eof() => break,
                    Some(Err(e)) => {
                        log::warn!("Discarding corrupt telemetry data: {}", e);
                        corrupt = true;
                        break;
                    }
                    None => {
                        consumed = stream.byte_offset();
                        break;
                    }
                }
            }
        }

        if corrupt {
            self.discarded_bytes += (self.buffer.len() - consumed) as u64;
            self.buffer.clear();
        } else {
            self.buffer.drain(..consumed);
            if self.buffer.len() > MAX_PENDING_BYTES {
                log::warn!(
                    "Discarding {} bytes of unterminated telemetry data",
                    self.buffer.len()
                );
                self.discarded_bytes += self.buffer.len() as u64;
                self.buffer.clear();
            }
        }
        records
    }

    /// Bytes waiting for the rest of their object
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes dropped as corrupt
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded_bytes
    }
}
