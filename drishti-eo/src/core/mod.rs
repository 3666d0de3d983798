//! Core abstractions for the camera pipeline.
//!
//! - [`pipeline`]: Collaborator traits (frame source, processor, sinks)
//! - [`types`]: Frames, bearings and camera properties

pub mod pipeline;
pub mod types;
