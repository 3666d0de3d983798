//! Stream/display toggles shared between the command listener and the
//! control loop.
//!
//! `SharedFlags` is a cheap cloneable handle. The command listener is the
//! only writer (through [`SharedFlags::apply`], crate-private); every other
//! holder reads. Reads are lock-free and observe the latest applied command.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::streaming::wire::Command;

#[derive(Debug, Default)]
struct FlagsInner {
    stream_enabled: AtomicBool,
    display_enabled: AtomicBool,
}

/// Handle to the stream/display flags.
#[derive(Debug, Clone, Default)]
pub struct SharedFlags {
    inner: Arc<FlagsInner>,
}

/// Point-in-time copy of both flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagSnapshot {
    pub stream_enabled: bool,
    pub display_enabled: bool,
}

impl SharedFlags {
    /// Create flags with explicit initial values.
    pub fn new(stream_enabled: bool, display_enabled: bool) -> Self {
        Self {
            inner: Arc::new(FlagsInner {
                stream_enabled: AtomicBool::new(stream_enabled),
                display_enabled: AtomicBool::new(display_enabled),
            }),
        }
    }

    pub fn is_stream_enabled(&self) -> bool {
        self.inner.stream_enabled.load(Ordering::Acquire)
    }

    pub fn is_display_enabled(&self) -> bool {
        self.inner.display_enabled.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> FlagSnapshot {
        FlagSnapshot {
            stream_enabled: self.is_stream_enabled(),
            display_enabled: self.is_display_enabled(),
        }
    }

    /// Apply a decoded command. Returns true if a flag changed value.
    pub(crate) fn apply(&self, command: Command) -> bool {
        let (flag, value) = match command {
            Command::EnableStream => (&self.inner.stream_enabled, true),
            Command::DisableStream => (&self.inner.stream_enabled, false),
            Command::EnableDisplay => (&self.inner.display_enabled, true),
            Command::DisableDisplay => (&self.inner.display_enabled, false),
        };
        flag.swap(value, Ordering::AcqRel) != value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_disabled() {
        let flags = SharedFlags::default();
        assert_eq!(flags.snapshot(), FlagSnapshot::default());
    }

    #[test]
    fn test_apply_each_command() {
        let flags = SharedFlags::default();

        assert!(flags.apply(Command::EnableStream));
        assert!(flags.is_stream_enabled());
        assert!(!flags.is_display_enabled());

        assert!(flags.apply(Command::EnableDisplay));
        assert!(flags.is_display_enabled());

        assert!(flags.apply(Command::DisableStream));
        assert!(!flags.is_stream_enabled());

        assert!(flags.apply(Command::DisableDisplay));
        assert!(!flags.is_display_enabled());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let flags = SharedFlags::default();

        // Already disabled
        assert!(!flags.apply(Command::DisableStream));
        assert!(!flags.is_stream_enabled());

        assert!(flags.apply(Command::EnableDisplay));
        assert!(!flags.apply(Command::EnableDisplay));
        assert!(flags.is_display_enabled());
    }

    #[test]
    fn test_clones_share_state() {
        let writer = SharedFlags::new(false, true);
        let reader = writer.clone();

        writer.apply(Command::EnableStream);
        writer.apply(Command::DisableDisplay);

        assert_eq!(
            reader.snapshot(),
            FlagSnapshot {
                stream_enabled: true,
                display_enabled: false,
            }
        );
    }
}
