//! Replay of raw recordings as a frame source

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use super::recorder::read_frame;
use crate::core::pipeline::FrameSource;
use crate::core::types::{CameraProperties, Frame};
use crate::error::{Error, Result};

/// Plays a recording back at the configured frame rate, then closes
pub struct ReplaySource {
    reader: Option<BufReader<File>>,
    /// First frame, read at open time to learn the geometry
    pending: Option<Frame>,
    properties: CameraProperties,
    frame_interval: Duration,
    next_frame_at: Option<Instant>,
}

impl ReplaySource {
    /// Open a recording
    ///
    /// # Errors
    /// [`Error::CameraOpen`] if the file is missing, unreadable or empty.
    pub fn open<P: AsRef<Path>>(path: P, fps: u32) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::CameraOpen(format!("{}: {}", path.display(), e)))?;
        let mut reader = BufReader::new(file);

        let first = read_frame(&mut reader)
            .map_err(|e| Error::CameraOpen(format!("{}: {}", path.display(), e)))?
            .ok_or_else(|| Error::CameraOpen(format!("{}: empty recording", path.display())))?;

        let properties = CameraProperties {
            width: first.width,
            height: first.height,
            fps,
        };
        log::info!(
            "Replaying {} ({}x{} @ {} fps)",
            path.display(),
            properties.width,
            properties.height,
            fps
        );

        Ok(Self {
            reader: Some(reader),
            pending: Some(first),
            properties,
            frame_interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            next_frame_at: None,
        })
    }

    fn pace(&mut self) {
        let now = Instant::now();
        if let Some(at) = self.next_frame_at {
            if at > now {
                thread::sleep(at - now);
            }
        }
        self.next_frame_at = Some(Instant::now() + self.frame_interval);
    }
}

impl FrameSource for ReplaySource {
    fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    fn read_frame(&mut self) -> Result<Frame> {
        if let Some(frame) = self.pending.take() {
            self.pace();
            return Ok(frame);
        }
        let Some(reader) = self.reader.as_mut() else {
            return Err(Error::CameraRead("replay source closed".into()));
        };
        match read_frame(reader) {
            Ok(Some(frame)) => {
                self.pace();
                Ok(frame)
            }
            Ok(None) => {
                log::info!("Replay reached end of recording");
                self.reader = None;
                Err(Error::CameraRead("end of recording".into()))
            }
            Err(e) => {
                self.reader = None;
                Err(e)
            }
        }
    }

    fn release(&mut self) {
        self.pending = None;
        if self.reader.take().is_some() {
            log::debug!("Replay source released");
        }
    }

    fn properties(&self) -> CameraProperties {
        self.properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::FrameSink;
    use crate::devices::recorder::RawRecorder;

    #[test]
    fn test_replays_recording_then_closes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.raw");
        {
            let mut recorder = RawRecorder::create(&path).unwrap();
            for seq in 0..3 {
                recorder
                    .write(&Frame::new(seq, 2, 2, vec![seq as u8; 4]).unwrap())
                    .unwrap();
            }
            recorder.release().unwrap();
        }

        let mut source = ReplaySource::open(&path, 1000).unwrap();
        assert_eq!(source.properties().width, 2);
        assert_eq!(source.properties().fps, 1000);

        for seq in 0..3 {
            assert!(source.is_open());
            assert_eq!(source.read_frame().unwrap().sequence, seq);
        }
        assert!(matches!(source.read_frame(), Err(Error::CameraRead(_))));
        assert!(!source.is_open());

        source.release();
        source.release();
    }

    #[test]
    fn test_open_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ReplaySource::open(dir.path().join("missing.raw"), 30);
        assert!(matches!(missing, Err(Error::CameraOpen(_))));

        let empty_path = dir.path().join("empty.raw");
        std::fs::write(&empty_path, b"").unwrap();
        let empty = ReplaySource::open(&empty_path, 30);
        assert!(matches!(empty, Err(Error::CameraOpen(_))));
    }
}
