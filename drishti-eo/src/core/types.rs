//! Core data types shared by the camera pipeline.
//!
//! Key types for collaborator implementers:
//! - [`Frame`]: One captured 8-bit grayscale image
//! - [`Bearing`]: Processor output (azimuth, elevation, distance)
//! - [`CameraProperties`]: Geometry and rate reported by a frame source

use crate::error::{Error, Result};

/// One captured video frame
///
/// Pixels are 8-bit grayscale in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Capture sequence number (monotonic per source)
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    /// Create a frame, checking that the pixel buffer matches the geometry
    pub fn new(sequence: u64, width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(Error::InvalidParameter(format!(
                "frame {}x{} needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }
        Ok(Self {
            sequence,
            width,
            height,
            pixels,
        })
    }

    /// Pixel value at (x, y), `None` outside the frame
    pub fn pixel(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Nearest-neighbour downscale by an integer factor
    ///
    /// A divisor of 0 or 1 returns an unchanged copy. Output dimensions never
    /// drop below 1x1.
    pub fn downscale(&self, divisor: u32) -> Frame {
        if divisor <= 1 {
            return self.clone();
        }
        let width = (self.width / divisor).max(1);
        let height = (self.height / divisor).max(1);
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            let src_y = (y * divisor).min(self.height.saturating_sub(1));
            let row = src_y as usize * self.width as usize;
            for x in 0..width {
                let src_x = (x * divisor).min(self.width.saturating_sub(1));
                pixels.push(self.pixels[row + src_x as usize]);
            }
        }
        Frame {
            sequence: self.sequence,
            width,
            height,
            pixels,
        }
    }

    /// Mean pixel intensity (0.0 for an empty frame)
    pub fn mean_intensity(&self) -> f64 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.pixels.iter().map(|&p| p as u64).sum();
        sum as f64 / self.pixels.len() as f64
    }
}

/// Target bearing produced by a frame processor
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bearing {
    /// Signed bearing offset in degrees
    pub azimuth: f64,
    /// Signed bearing offset in degrees
    pub elevation: f64,
    /// Range to target; 0.0 when unknown
    pub distance: f64,
}

impl Bearing {
    pub fn new(azimuth: f64, elevation: f64, distance: f64) -> Self {
        Self {
            azimuth,
            elevation,
            distance,
        }
    }
}

/// Geometry and capture rate of a frame source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraProperties {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn gradient(width: u32, height: u32) -> Frame {
        let pixels = (0..width * height).map(|i| (i % 256) as u8).collect();
        Frame::new(7, width, height, pixels).unwrap()
    }

    #[test]
    fn test_frame_rejects_wrong_buffer_size() {
        assert!(Frame::new(0, 4, 4, vec![0; 15]).is_err());
        assert!(Frame::new(0, 4, 4, vec![0; 16]).is_ok());
    }

    #[test]
    fn test_pixel_lookup() {
        let frame = gradient(4, 3);
        assert_eq!(frame.pixel(0, 0), Some(0));
        assert_eq!(frame.pixel(3, 2), Some(11));
        assert_eq!(frame.pixel(4, 0), None);
        assert_eq!(frame.pixel(0, 3), None);
    }

    #[test]
    fn test_downscale_halves_dimensions() {
        let frame = gradient(8, 6);
        let small = frame.downscale(2);
        assert_eq!((small.width, small.height), (4, 3));
        assert_eq!(small.pixels.len(), 12);
        assert_eq!(small.sequence, 7);
        // (1, 1) in the small frame samples (2, 2) in the source
        assert_eq!(small.pixel(1, 1), frame.pixel(2, 2));
    }

    #[test]
    fn test_downscale_never_empty() {
        let frame = gradient(3, 3);
        let tiny = frame.downscale(10);
        assert_eq!((tiny.width, tiny.height), (1, 1));
        assert_eq!(frame.downscale(1), frame);
    }

    #[test]
    fn test_mean_intensity() {
        let frame = Frame::new(0, 2, 2, vec![0, 100, 200, 100]).unwrap();
        assert_relative_eq!(frame.mean_intensity(), 100.0);
    }
}
