//! Frame sources and frame outputs
//!
//! | Source (`camera.source`) | Description |
//! |--------------------------|-------------|
//! | `synthetic` | Simulated camera with a moving bright target |
//! | `replay` | Plays back a raw recording from `camera.device` |
//!
//! Outputs are [`FrameSink`](crate::core::pipeline::FrameSink)s: the headless
//! [`LogDisplay`] and the [`RawRecorder`].

pub mod display;
pub mod recorder;
pub mod replay;
pub mod synthetic;

pub use display::LogDisplay;
pub use recorder::RawRecorder;
pub use replay::ReplaySource;
pub use synthetic::SyntheticCamera;

use crate::config::CameraConfig;
use crate::core::pipeline::FrameSource;
use crate::error::{Error, Result};

/// Create a frame source based on configuration
pub fn create_frame_source(config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    match config.source.as_str() {
        "synthetic" => Ok(Box::new(SyntheticCamera::new(
            config.width,
            config.height,
            config.fps,
            config.max_frames,
            0,
        )?)),
        "replay" => Ok(Box::new(ReplaySource::open(&config.device, config.fps)?)),
        other => Err(Error::UnknownSource(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_source() {
        let config = CameraConfig {
            source: "v4l2".to_string(),
            ..CameraConfig::default()
        };
        assert!(matches!(
            create_frame_source(&config),
            Err(Error::UnknownSource(name)) if name == "v4l2"
        ));
    }

    #[test]
    fn test_synthetic_source_geometry() {
        let config = CameraConfig {
            width: 32,
            height: 24,
            ..CameraConfig::default()
        };
        let source = create_frame_source(&config).unwrap();
        assert!(source.is_open());
        assert_eq!(source.properties().width, 32);
        assert_eq!(source.properties().height, 24);
    }
}
