//! Collaborator traits for the camera pipeline
//!
//! The control loop only talks to the camera, the detector and the frame
//! outputs through these traits, so a real camera or detector can be plugged
//! in without touching the networking or session logic.

use crate::core::types::{Bearing, CameraProperties, Frame};
use crate::error::Result;

/// Frame source trait (camera, recording, simulator)
pub trait FrameSource: Send {
    /// Whether the source can still deliver frames
    fn is_open(&self) -> bool;

    /// Read the next frame, blocking until one is available
    ///
    /// An error means the source is gone; the session ends.
    fn read_frame(&mut self) -> Result<Frame>;

    /// Release the underlying device. Must tolerate repeated calls.
    fn release(&mut self);

    /// Geometry and capture rate
    fn properties(&self) -> CameraProperties;
}

/// Frame processor trait (target detector)
pub trait FrameProcessor: Send {
    /// Locate the target in a frame
    fn process(&mut self, frame: &Frame) -> Bearing;
}

/// Frame output trait (display, recorder, video streamer)
pub trait FrameSink: Send {
    /// Short name used in log messages
    fn name(&self) -> &str;

    /// Consume one processed frame
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close the output
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}
