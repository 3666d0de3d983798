//! Process-wide runtime state.
//!
//! - `SharedFlags`: stream/display toggles written by the command listener
//!   and read by the control loop

mod flags;

pub use flags::{FlagSnapshot, SharedFlags};
