//! Error types for Drishti EO

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Drishti EO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Listening or receiving socket could not be bound
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Address that was requested
        address: String,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Camera could not be opened
    #[error("Camera open failed: {0}")]
    CameraOpen(String),

    /// Frame read failed (camera assumed disconnected)
    #[error("Camera read failed: {0}")]
    CameraRead(String),

    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Telemetry encoding/decoding failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Unknown frame source in configuration
    #[error("Unknown frame source: {0}")]
    UnknownSource(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Process exit status used by the daemon when this error aborts startup.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::CameraOpen(_) | Error::UnknownSource(_) => 2,
            _ => 1,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let bind = Error::Bind {
            address: "0.0.0.0:3456".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(bind.exit_code(), 1);
        assert_eq!(Error::CameraOpen("/dev/video0".into()).exit_code(), 2);
        assert_eq!(Error::Config("bad".into()).exit_code(), 1);
    }

    #[test]
    fn test_bind_error_message() {
        let err = Error::Bind {
            address: "127.0.0.1:2468".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
        };
        assert_eq!(
            err.to_string(),
            "Failed to bind 127.0.0.1:2468: address in use"
        );
    }
}
