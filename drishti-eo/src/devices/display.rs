//! Headless display sink
//!
//! Stands in for a video window on nodes without a screen: each shown frame
//! is summarised in the log, throttled so a 30 fps stream stays readable.

use std::time::{Duration, Instant};

use crate::core::pipeline::FrameSink;
use crate::core::types::Frame;
use crate::error::Result;

/// Default minimum gap between logged frame summaries
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(1);

pub struct LogDisplay {
    interval: Duration,
    last_logged: Option<Instant>,
    frames_shown: u64,
}

impl LogDisplay {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_logged: None,
            frames_shown: 0,
        }
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }
}

impl Default for LogDisplay {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_INTERVAL)
    }
}

impl FrameSink for LogDisplay {
    fn name(&self) -> &str {
        "display"
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        self.frames_shown += 1;
        let now = Instant::now();
        let due = self
            .last_logged
            .is_none_or(|last| now.duration_since(last) >= self.interval);
        if due {
            log::info!(
                "Frame {} {}x{} mean intensity {:.1}",
                frame.sequence,
                frame.width,
                frame.height,
                frame.mean_intensity()
            );
            self.last_logged = Some(now);
        }
        Ok(())
    }
}
