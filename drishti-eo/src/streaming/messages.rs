//! Telemetry message types.
//!
//! One [`TelemetryRecord`] is emitted per publish tick. The timestamp is the
//! local wall-clock time of sending, in seconds since local midnight with
//! sub-second precision. It is non-decreasing within a session except across
//! midnight, where it wraps back to zero.

use chrono::{DateTime, Local, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use crate::core::types::Bearing;

/// Bearing report sent to telemetry clients
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TelemetryRecord {
    /// Seconds since local midnight at send time
    pub timestamp: f64,
    /// Signed bearing offset in degrees
    pub azimuth: f64,
    /// Signed bearing offset in degrees
    pub elevation: f64,
    /// Range to target; 0.0 when unknown
    pub distance: f64,
}

impl TelemetryRecord {
    /// Build a record stamped with the current local time
    pub fn now(bearing: Bearing) -> Self {
        Self::at(bearing, &Local::now())
    }

    /// Build a record stamped with the given time
    pub fn at<Tz: TimeZone>(bearing: Bearing, time: &DateTime<Tz>) -> Self {
        Self {
            timestamp: seconds_since_midnight(time),
            azimuth: bearing.azimuth,
            elevation: bearing.elevation,
            distance: bearing.distance,
        }
    }

    pub fn bearing(&self) -> Bearing {
        Bearing::new(self.azimuth, self.elevation, self.distance)
    }
}

/// Seconds elapsed since midnight of the time's own day, with microsecond
/// precision
pub fn seconds_since_midnight<Tz: TimeZone>(time: &DateTime<Tz>) -> f64 {
    let seconds = time.num_seconds_from_midnight() as f64;
    // Leap seconds are reported as nanosecond >= 1e9; clamp them into the second
    let micros = (time.nanosecond() / 1_000).min(999_999) as f64;
    seconds + micros / 1_000_000.0
}
