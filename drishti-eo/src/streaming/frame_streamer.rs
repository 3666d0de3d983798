//! UDP video frame streamer
//!
//! Sends processed frames to a single viewer while the remote stream flag is
//! enabled. Frames larger than one datagram are split into chunks:
//!
//! ```text
//! ┌──────────────┬─────────────┬─────────────┬─────────┬──────────┬─────────────┐
//! │ Sequence u32 │ Chunk u16   │ Chunks u16  │ Width   │ Height   │ Pixel data  │
//! │ big-endian   │ index (BE)  │ total (BE)  │ u16 BE  │ u16 BE   │ ≤ 1388 B    │
//! └──────────────┴─────────────┴─────────────┴─────────┴──────────┴─────────────┘
//! ```
//!
//! Best-effort like the rest of the node: a lost chunk loses the frame on
//! the viewer side, and a send error is reported to the caller, which logs it.

use std::net::{SocketAddr, UdpSocket};

use crate::core::pipeline::FrameSink;
use crate::core::types::Frame;
use crate::error::{Error, Result};

/// Chunk header size in bytes
pub const CHUNK_HEADER_LEN: usize = 12;

/// Datagram size kept under a typical Ethernet MTU
pub const MAX_DATAGRAM_LEN: usize = 1400;

/// Pixel bytes carried per chunk
pub const CHUNK_PAYLOAD_LEN: usize = MAX_DATAGRAM_LEN - CHUNK_HEADER_LEN;

/// Header of one frame chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub sequence: u32,
    pub index: u16,
    pub count: u16,
    pub width: u16,
    pub height: u16,
}

impl ChunkHeader {
    pub fn encode(&self) -> [u8; CHUNK_HEADER_LEN] {
        let mut out = [0u8; CHUNK_HEADER_LEN];
        out[0..4].copy_from_slice(&self.sequence.to_be_bytes());
        out[4..6].copy_from_slice(&self.index.to_be_bytes());
        out[6..8].copy_from_slice(&self.count.to_be_bytes());
        out[8..10].copy_from_slice(&self.width.to_be_bytes());
        out[10..12].copy_from_slice(&self.height.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < CHUNK_HEADER_LEN {
            return None;
        }
        Some(Self {
            sequence: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            index: u16::from_be_bytes([bytes[4], bytes[5]]),
            count: u16::from_be_bytes([bytes[6], bytes[7]]),
            width: u16::from_be_bytes([bytes[8], bytes[9]]),
            height: u16::from_be_bytes([bytes[10], bytes[11]]),
        })
    }
}

/// Frame sink that unicasts chunked frames to one target
pub struct UdpFrameStreamer {
    socket: UdpSocket,
    target: SocketAddr,
    /// Reusable datagram buffer
    buffer: Vec<u8>,
    frames_sent: u64,
}

impl UdpFrameStreamer {
    /// Create a streamer sending from an ephemeral local port
    pub fn new(target: SocketAddr) -> Result<Self> {
        let bind = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind).map_err(|source| Error::Bind {
            address: bind.to_string(),
            source,
        })?;
        log::info!("Frame streaming target: {}", target);
        Ok(Self {
            socket,
            target,
            buffer: Vec::with_capacity(MAX_DATAGRAM_LEN),
            frames_sent: 0,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }
}

impl FrameSink for UdpFrameStreamer {
    fn name(&self) -> &str {
        "stream"
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        let width = u16::try_from(frame.width)
            .map_err(|_| Error::InvalidParameter(format!("frame width {} too large", frame.width)))?;
        let height = u16::try_from(frame.height).map_err(|_| {
            Error::InvalidParameter(format!("frame height {} too large", frame.height))
        })?;
        let chunks: Vec<&[u8]> = frame.pixels.chunks(CHUNK_PAYLOAD_LEN).collect();
        let count = u16::try_from(chunks.len().max(1))
            .map_err(|_| Error::InvalidParameter("frame too large to stream".into()))?;

        for index in 0..count {
            let header = ChunkHeader {
                sequence: frame.sequence as u32,
                index,
                count,
                width,
                height,
            };
            self.buffer.clear();
            self.buffer.extend_from_slice(&header.encode());
            if let Some(chunk) = chunks.get(index as usize) {
                self.buffer.extend_from_slice(chunk);
            }
            self.socket.send_to(&self.buffer, self.target)?;
        }

        self.frames_sent += 1;
        log::trace!("Streamed frame {} in {} chunks", frame.sequence, count);
        Ok(())
    }
}
