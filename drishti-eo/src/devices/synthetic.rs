//! Synthetic camera for hardware-free runs
//!
//! Renders a dark, noisy background with a bright square target moving on a
//! circle around the image centre (one revolution every four seconds of
//! simulated time). Frames are paced at the configured rate.

use std::f64::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};

use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::{Distribution, Normal};

use crate::core::pipeline::FrameSource;
use crate::core::types::{CameraProperties, Frame};
use crate::error::{Error, Result};

const BACKGROUND_LEVEL: f64 = 40.0;
const NOISE_STDDEV: f64 = 4.0;
const TARGET_LEVEL: u8 = 255;
const REVOLUTION_SECONDS: f64 = 4.0;

/// Simulated camera
pub struct SyntheticCamera {
    properties: CameraProperties,
    max_frames: Option<u64>,
    sequence: u64,
    open: bool,
    rng: SmallRng,
    noise: Normal<f64>,
    frame_interval: Duration,
    next_frame_at: Option<Instant>,
}

impl SyntheticCamera {
    /// Create a camera
    ///
    /// If seed is 0, uses random entropy; otherwise the noise is reproducible.
    pub fn new(width: u32, height: u32, fps: u32, max_frames: Option<u64>, seed: u64) -> Result<Self> {
        if width == 0 || height == 0 || fps == 0 {
            return Err(Error::CameraOpen(format!(
                "invalid synthetic camera geometry {}x{} @ {} fps",
                width, height, fps
            )));
        }
        let rng = if seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(seed)
        };
        let noise = Normal::new(0.0, NOISE_STDDEV)
            .map_err(|e| Error::CameraOpen(format!("noise model: {}", e)))?;

        log::info!("Synthetic camera {}x{} @ {} fps", width, height, fps);

        Ok(Self {
            properties: CameraProperties { width, height, fps },
            max_frames,
            sequence: 0,
            open: true,
            rng,
            noise,
            frame_interval: Duration::from_secs_f64(1.0 / fps as f64),
            next_frame_at: None,
        })
    }

    /// Target centre for a given frame, in pixels
    pub fn target_position(&self, sequence: u64) -> (f64, f64) {
        let CameraProperties { width, height, fps } = self.properties;
        let angle = TAU * sequence as f64 / (REVOLUTION_SECONDS * fps as f64);
        let radius = width.min(height) as f64 / 4.0;
        (
            width as f64 / 2.0 + radius * angle.cos(),
            height as f64 / 2.0 + radius * angle.sin(),
        )
    }

    fn target_half_size(&self) -> f64 {
        (self.properties.width.min(self.properties.height) as f64 / 40.0).max(1.0)
    }

    fn render(&mut self) -> Frame {
        let CameraProperties { width, height, .. } = self.properties;
        let (cx, cy) = self.target_position(self.sequence);
        let half = self.target_half_size();

        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let in_target = (x as f64 - cx).abs() <= half && (y as f64 - cy).abs() <= half;
                let value = if in_target {
                    TARGET_LEVEL
                } else {
                    let sample = BACKGROUND_LEVEL + self.noise.sample(&mut self.rng);
                    sample.clamp(0.0, 200.0) as u8
                };
                pixels.push(value);
            }
        }

        Frame {
            sequence: self.sequence,
            width,
            height,
            pixels,
        }
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

impl FrameSource for SyntheticCamera {
    fn is_open(&self) -> bool {
        self.open
    }

    fn read_frame(&mut self) -> Result<Frame> {
        if !self.open {
            return Err(Error::CameraRead("synthetic camera closed".into()));
        }
        if let Some(max) = self.max_frames {
            if self.sequence >= max {
                log::info!("Synthetic camera reached {} frames", max);
                self.open = false;
                return Err(Error::CameraRead("frame limit reached".into()));
            }
        }

        self.pace();
        let frame = self.render();
        self.sequence += 1;
        if self.max_frames.is_some_and(|max| self.sequence >= max) {
            self.open = false;
        }
        Ok(frame)
    }

    fn release(&mut self) {
        if self.open {
            log::debug!("Synthetic camera released");
        }
        self.open = false;
    }

    fn properties(&self) -> CameraProperties {
        self.properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brightest_pixels_are_target() {
        let mut camera = SyntheticCamera::new(80, 60, 1000, None, 42).unwrap();
        let frame = camera.read_frame().unwrap();
        assert_eq!(frame.pixels.len(), 80 * 60);

        let (cx, cy) = camera.target_position(0);
        assert_eq!(frame.pixel(cx as u32, cy as u32), Some(TARGET_LEVEL));
        // Background never reaches target brightness
        assert_eq!(frame.pixel(0, 0).map(|p| p < TARGET_LEVEL), Some(true));
    }

    #[test]
    fn test_target_moves() {
        let camera = SyntheticCamera::new(80, 60, 30, None, 1).unwrap();
        assert_ne!(camera.target_position(0), camera.target_position(10));
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let mut a = SyntheticCamera::new(16, 16, 1000, None, 7).unwrap();
        let mut b = SyntheticCamera::new(16, 16, 1000, None, 7).unwrap();
        assert_eq!(a.read_frame().unwrap(), b.read_frame().unwrap());
    }

    #[test]
    fn test_closes_after_max_frames() {
        let mut camera = SyntheticCamera::new(8, 8, 1000, Some(2), 3).unwrap();
        assert_eq!(camera.read_frame().unwrap().sequence, 0);
        assert!(camera.is_open());
        assert_eq!(camera.read_frame().unwrap().sequence, 1);
        assert!(!camera.is_open());
        assert!(camera.read_frame().is_err());
    }

    #[test]
    fn test_pacing() {
        let mut camera = SyntheticCamera::new(4, 4, 50, None, 3).unwrap();
        let started = Instant::now();
        for _ in 0..4 {
            camera.read_frame().unwrap();
        }
        // Three full intervals at 50 fps
        assert!(started.elapsed() >= Duration::from_millis(55));
    }

    #[test]
    fn test_rejects_zero_fps() {
        assert!(matches!(
            SyntheticCamera::new(8, 8, 0, None, 0),
            Err(Error::CameraOpen(_))
        ));
    }
}
