//! Raw frame recording
//!
//! Recordings are a plain concatenation of frames, each with a fixed
//! little-endian header:
//!
//! ```text
//! ┌───────────┬────────────┬──────────────┬────────────┬──────────────┐
//! │ Width u32 │ Height u32 │ Sequence u64 │ Length u32 │ Pixels       │
//! └───────────┴────────────┴──────────────┴────────────┴──────────────┘
//! ```
//!
//! The same format is read back by [`super::replay::ReplaySource`].

use std::fs::File;
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::core::pipeline::FrameSink;
use crate::core::types::Frame;
use crate::error::{Error, Result};

/// Size of the per-frame header
pub const FRAME_HEADER_LEN: usize = 20;

/// Largest pixel block accepted on replay (an 8K grayscale frame fits)
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Append one frame to a recording
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<()> {
    let length = u32::try_from(frame.pixels.len())
        .map_err(|_| Error::InvalidParameter("frame too large to record".into()))?;
    let mut header = [0u8; FRAME_HEADER_LEN];
    header[0..4].copy_from_slice(&frame.width.to_le_bytes());
    header[4..8].copy_from_slice(&frame.height.to_le_bytes());
    header[8..16].copy_from_slice(&frame.sequence.to_le_bytes());
    header[16..20].copy_from_slice(&length.to_le_bytes());
    writer.write_all(&header)?;
    writer.write_all(&frame.pixels)?;
    Ok(())
}

/// Read the next frame of a recording
///
/// Returns `Ok(None)` at a clean end of file. A header or pixel block cut
/// short is reported as [`Error::CameraRead`].
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Frame>> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    let mut filled = 0;
    while filled < FRAME_HEADER_LEN {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(Error::CameraRead("truncated frame header".into())),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let width = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let height = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let mut sequence_bytes = [0u8; 8];
    sequence_bytes.copy_from_slice(&header[8..16]);
    let sequence = u64::from_le_bytes(sequence_bytes);
    let length = u32::from_le_bytes([header[16], header[17], header[18], header[19]]) as usize;
    // Checked before allocating so a corrupt header cannot force a huge buffer
    if length as u64 != width as u64 * height as u64 {
        return Err(Error::CameraRead(format!(
            "frame {} length {} does not match {}x{}",
            sequence, length, width, height
        )));
    }
    if length > MAX_FRAME_BYTES {
        return Err(Error::CameraRead(format!(
            "frame {} is {} bytes, limit is {}",
            sequence, length, MAX_FRAME_BYTES
        )));
    }

    let mut pixels = vec![0u8; length];
    reader.read_exact(&mut pixels).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => Error::CameraRead("truncated frame data".into()),
        _ => Error::Io(e),
    })?;

    Frame::new(sequence, width, height, pixels)
        .map(Some)
        .map_err(|e| Error::CameraRead(e.to_string()))
}

/// Frame sink writing every processed frame to a raw recording
pub struct RawRecorder {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    frames_written: u64,
}

impl RawRecorder {
    /// Create (or truncate) the recording file
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        log::info!("Recording frames to {}", path.display());
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            frames_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl FrameSink for RawRecorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(Error::Other("recorder already released".into()));
        };
        write_frame(writer, frame)?;
        self.frames_written += 1;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            log::info!(
                "Recording closed: {} frames in {}",
                self.frames_written,
                self.path.display()
            );
        }
        Ok(())
    }
}

impl Drop for RawRecorder {
    fn drop(&mut self) {
        if let Err(e) = FrameSink::release(self) {
            log::warn!("Failed to flush recording {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frame(sequence: u64) -> Frame {
        Frame::new(sequence, 4, 3, (0..12).collect()).unwrap()
    }

    #[test]
    fn test_header_layout() {
        let mut bytes = Vec::new();
        write_frame(&mut bytes, &frame(0x0102)).unwrap();

        assert_eq!(bytes.len(), FRAME_HEADER_LEN + 12);
        assert_eq!(&bytes[0..4], &[4, 0, 0, 0]);
        assert_eq!(&bytes[4..8], &[3, 0, 0, 0]);
        assert_eq!(&bytes[8..10], &[0x02, 0x01]);
        assert_eq!(&bytes[16..20], &[12, 0, 0, 0]);
    }

    #[test]
    fn test_read_until_eof() {
        let mut bytes = Vec::new();
        write_frame(&mut bytes, &frame(1)).unwrap();
        write_frame(&mut bytes, &frame(2)).unwrap();

        let mut cursor = Cursor::new(bytes);
        assert_eq!(read_frame(&mut cursor).unwrap(), Some(frame(1)));
        assert_eq!(read_frame(&mut cursor).unwrap(), Some(frame(2)));
        assert_eq!(read_frame(&mut cursor).unwrap(), None);
    }

    #[test]
    fn test_truncated_recording() {
        let mut bytes = Vec::new();
        write_frame(&mut bytes, &frame(1)).unwrap();

        let mut short_header = Cursor::new(bytes[..10].to_vec());
        assert!(matches!(
            read_frame(&mut short_header),
            Err(Error::CameraRead(_))
        ));

        let mut short_pixels = Cursor::new(bytes[..bytes.len() - 1].to_vec());
        assert!(matches!(
            read_frame(&mut short_pixels),
            Err(Error::CameraRead(_))
        ));
    }

    #[test]
    fn test_length_mismatch_rejected_before_reading_pixels() {
        let mut bytes = Vec::new();
        write_frame(&mut bytes, &frame(1)).unwrap();
        // Claim a ~4 GiB pixel block for a 4x3 frame
        bytes[16..20].copy_from_slice(&u32::MAX.to_le_bytes());

        let mut cursor = Cursor::new(bytes);
        match read_frame(&mut cursor) {
            Err(Error::CameraRead(message)) => assert!(message.contains("does not match")),
            other => panic!("unexpected result: {:?}", other),
        }

        // Consistent but oversized geometry is refused as well
        let mut bytes = Vec::new();
        write_frame(&mut bytes, &frame(2)).unwrap();
        bytes[0..4].copy_from_slice(&65_535u32.to_le_bytes());
        bytes[4..8].copy_from_slice(&65_535u32.to_le_bytes());
        bytes[16..20].copy_from_slice(&(65_535u32 * 65_535).to_le_bytes());
        let mut cursor = Cursor::new(bytes);
        match read_frame(&mut cursor) {
            Err(Error::CameraRead(message)) => assert!(message.contains("limit")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_recorder_release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.raw");

        let mut recorder = RawRecorder::create(&path).unwrap();
        recorder.write(&frame(1)).unwrap();
        recorder.write(&frame(2)).unwrap();
        recorder.release().unwrap();
        recorder.release().unwrap();
        assert!(recorder.write(&frame(3)).is_err());
        assert_eq!(recorder.frames_written(), 2);

        let len = std::fs::metadata(&path).unwrap().len() as usize;
        assert_eq!(len, 2 * (FRAME_HEADER_LEN + 12));
    }
}
