//! Configuration for the Drishti EO tracker
//!
//! Loads configuration from a TOML file. Every section falls back to its
//! defaults, so a file only needs the values it changes.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Default TCP telemetry port
pub const DEFAULT_TELEMETRY_PORT: u16 = 3456;

/// Default UDP command port
pub const DEFAULT_COMMAND_PORT: u16 = 2468;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub telemetry: TelemetryConfig,
    pub command: CommandConfig,
    pub camera: CameraConfig,
    pub tracking: TrackingConfig,
    pub logging: LoggingConfig,
}

/// TCP telemetry server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Interface to listen on (e.g. `0.0.0.0` or `127.0.0.1`)
    pub bind_address: String,
    pub port: u16,
    /// Bounded wait for accept/read loops; bounds how long `stop()` takes
    pub poll_timeout_ms: u64,
    /// Per-client write timeout during broadcast
    pub write_timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_TELEMETRY_PORT,
            poll_timeout_ms: 3000,
            write_timeout_ms: 500,
        }
    }
}

impl TelemetryConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// UDP command listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CommandConfig {
    pub bind_address: String,
    pub port: u16,
    pub poll_timeout_ms: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_COMMAND_PORT,
            poll_timeout_ms: 3000,
        }
    }
}

impl CommandConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Camera (frame source) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Frame source type: "synthetic" or "replay"
    pub source: String,
    /// Device or recording path (replay source reads this file)
    pub device: String,
    pub width: u32,
    pub height: u32,
    /// Capture rate in frames per second
    pub fps: u32,
    /// Frames are downscaled by this factor before processing (1 = full size)
    pub scale_divisor: u32,
    /// Close the camera after this many frames (synthetic source only)
    pub max_frames: Option<u64>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: "synthetic".to_string(),
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            fps: 30,
            scale_divisor: 2,
            max_frames: None,
        }
    }
}

/// Control loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Telemetry publish rate in Hz, independent of camera FPS
    pub publish_rate_hz: f64,
    /// Poll interval while waiting for the first telemetry client
    pub client_poll_interval_ms: u64,
    /// Always show frames on the display sink (OR'ed with the remote display flag)
    pub display: bool,
    /// Return to waiting for a client when the last one disconnects
    pub wait_for_reconnect: bool,
    /// Record processed frames to this file
    pub record_path: Option<String>,
    /// Stream processed frames to this `ip:port` while streaming is enabled
    pub stream_target: Option<String>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            publish_rate_hz: 1.0,
            client_poll_interval_ms: 1000,
            display: false,
            wait_for_reconnect: false,
            record_path: None,
            stream_target: None,
        }
    }
}

impl TrackingConfig {
    /// Minimum gap between two telemetry broadcasts
    pub fn publish_interval(&self) -> Duration {
        // Rates too small for a Duration are rejected by `validate`
        Duration::try_from_secs_f64(1.0 / self.publish_rate_hz).unwrap_or(Duration::MAX)
    }

    pub fn client_poll_interval(&self) -> Duration {
        Duration::from_millis(self.client_poll_interval_ms)
    }

    /// Parsed streaming target, if configured
    pub fn stream_addr(&self) -> Result<Option<SocketAddr>> {
        match &self.stream_target {
            Some(target) => target.parse().map(Some).map_err(|_| {
                Error::InvalidParameter(format!("stream_target '{}' is not ip:port", target))
            }),
            None => Ok(None),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use drishti_eo::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("drishti-eo.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        let rate = self.tracking.publish_rate_hz;
        if !(rate.is_finite() && rate > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "publish_rate_hz must be positive, got {}",
                rate
            )));
        }
        Duration::try_from_secs_f64(1.0 / rate).map_err(|_| {
            Error::InvalidParameter(format!("publish_rate_hz {} is too small", rate))
        })?;
        for (name, value) in [
            ("telemetry.poll_timeout_ms", self.telemetry.poll_timeout_ms),
            ("telemetry.write_timeout_ms", self.telemetry.write_timeout_ms),
            ("command.poll_timeout_ms", self.command.poll_timeout_ms),
        ] {
            if value == 0 {
                return Err(Error::InvalidParameter(format!("{} must be non-zero", name)));
            }
        }
        if self.camera.fps == 0 {
            return Err(Error::InvalidParameter("camera fps must be non-zero".into()));
        }
        if self.camera.scale_divisor == 0 {
            return Err(Error::InvalidParameter(
                "camera scale_divisor must be non-zero".into(),
            ));
        }
        self.tracking.stream_addr()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.telemetry.port, 3456);
        assert_eq!(config.command.port, 2468);
        assert_eq!(config.telemetry.bind_address, "0.0.0.0");
        assert_eq!(config.camera.source, "synthetic");
        assert_relative_eq!(config.tracking.publish_rate_hz, 1.0);
        assert_eq!(config.tracking.publish_interval(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_serialization() {
        let config = AppConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[telemetry]"));
        assert!(toml_string.contains("[command]"));
        assert!(toml_string.contains("[camera]"));
        assert!(toml_string.contains("[tracking]"));
        assert!(toml_string.contains("[logging]"));
        assert!(toml_string.contains("port = 3456"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_content = r#"
[telemetry]
bind_address = "127.0.0.1"

[tracking]
publish_rate_hz = 5.0
stream_target = "10.0.0.2:5600"

[logging]
level = "debug"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.telemetry.bind_address, "127.0.0.1");
        assert_eq!(config.telemetry.port, 3456);
        assert_eq!(config.command.port, 2468);
        assert_relative_eq!(config.tracking.publish_rate_hz, 5.0);
        assert_eq!(config.tracking.publish_interval(), Duration::from_millis(200));
        assert_eq!(
            config.tracking.stream_addr().unwrap(),
            Some("10.0.0.2:5600".parse().unwrap())
        );
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.tracking.publish_rate_hz = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.camera.scale_divisor = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.tracking.stream_target = Some("not-an-address".into());
        assert!(config.validate().is_err());
        let mut config = AppConfig::default();
        config.tracking.publish_rate_hz = 1e-20;
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(config.tracking.publish_interval(), Duration::MAX);

        let mut config = AppConfig::default();
        config.telemetry.poll_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.telemetry.write_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.command.poll_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drishti-eo.toml");

        let mut config = AppConfig::default();
        config.tracking.publish_rate_hz = 2.5;
        config.camera.max_frames = Some(100);
        config.to_file(&path).unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert_relative_eq!(loaded.tracking.publish_rate_hz, 2.5);
        assert_eq!(loaded.camera.max_frames, Some(100));
    }
}
