//! Target detection
//!
//! No detector ships yet. [`ZeroProcessor`] keeps the pipeline running and
//! reports a zero bearing for every frame until a real one is plugged in
//! through [`FrameProcessor`].

use crate::core::pipeline::FrameProcessor;
use crate::core::types::{Bearing, Frame};

/// Stub processor: azimuth, elevation and distance are always 0.0
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroProcessor;

impl FrameProcessor for ZeroProcessor {
    fn process(&mut self, _frame: &Frame) -> Bearing {
        Bearing::default()
    }
}
