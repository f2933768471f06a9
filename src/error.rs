//! # Error Types Module
//!
//! Centralized error handling for rallytrack.
//! Provides custom error types for each module with proper context and error chaining.
//!
//! ## Error Types
//! - `SensorError`: Sensor subscription and unsubscription failures
//! - `StoreError`: Session store argument validation, lookups and engine failures
//! - `ConfigError`: Configuration file I/O and parsing errors
//! - `CaptureError`: Recorded sensor capture I/O and parsing errors
//!
//! ## Usage Examples
//! ```rust,ignore
//! // Config module uses ConfigError
//! pub fn load() -> Result<Config, ConfigError> { ... }
//!
//! // Store module uses StoreError for write-strict operations
//! pub async fn delete_session(&self, id: i64) -> Result<u64, StoreError> { ... }
//!
//! // Sensor sources use SensorError
//! fn subscribe(&mut self, interval_ms: u64) -> Result<Receiver<T>, SensorError> { ... }
//! ```

use std::fmt;

/// Errors that can occur while opening or closing a sensor stream
#[derive(Debug, Clone, PartialEq)]
pub enum SensorError {
    /// The platform refused the subscription
    SubscribeFailed { sensor: &'static str, reason: String },
    /// The platform failed to release the subscription
    UnsubscribeFailed { sensor: &'static str, reason: String },
    /// Worker thread could not be spawned
    WorkerSpawn(String),
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::SubscribeFailed { sensor, reason } => {
                write!(f, "Failed to subscribe to {} sensor: {}", sensor, reason)
            }
            SensorError::UnsubscribeFailed { sensor, reason } => {
                write!(f, "Failed to unsubscribe from {} sensor: {}", sensor, reason)
            }
            SensorError::WorkerSpawn(msg) => {
                write!(f, "Failed to spawn sensor worker: {}", msg)
            }
        }
    }
}

impl std::error::Error for SensorError {}

/// Errors that can occur during session store operations
#[derive(Debug)]
pub enum StoreError {
    /// Argument rejected before any I/O (bad id, non-object update payload)
    InvalidArgument(String),
    /// No session row matches the requested id
    NotFound(i64),
    /// Underlying SQL engine failure, propagated unmodified
    Engine(rusqlite::Error),
    /// A schema migration step failed
    Migration { version: u32, source: Box<StoreError> },
    /// Blocking engine task panicked or was cancelled
    Join(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::InvalidArgument(msg) => {
                write!(f, "Invalid argument: {}", msg)
            }
            StoreError::NotFound(id) => {
                write!(f, "Session {} not found", id)
            }
            StoreError::Engine(e) => {
                write!(f, "SQL engine error: {}", e)
            }
            StoreError::Migration { version, source } => {
                write!(f, "Schema migration to version {} failed: {}", version, source)
            }
            StoreError::Join(msg) => {
                write!(f, "Storage task failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Engine(e) => Some(e),
            StoreError::Migration { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Engine(e)
    }
}

/// Errors that can occur during configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read config file
    ReadFailed(std::io::Error),
    /// Failed to write config file
    WriteFailed(std::io::Error),
    /// Failed to parse config file
    ParseFailed(toml::de::Error),
    /// Failed to serialize config
    SerializeFailed(toml::ser::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed(e) => {
                write!(f, "Failed to read config file: {}", e)
            }
            ConfigError::WriteFailed(e) => {
                write!(f, "Failed to write config file: {}", e)
            }
            ConfigError::ParseFailed(e) => {
                write!(f, "Failed to parse config file: {}", e)
            }
            ConfigError::SerializeFailed(e) => {
                write!(f, "Failed to serialize config: {}", e)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed(e) => Some(e),
            ConfigError::WriteFailed(e) => Some(e),
            ConfigError::ParseFailed(e) => Some(e),
            ConfigError::SerializeFailed(e) => Some(e),
        }
    }
}

/// Errors that can occur while reading a recorded sensor capture
#[derive(Debug)]
pub enum CaptureError {
    /// Failed to read the capture file
    ReadFailed(std::io::Error),
    /// A line is not a timestamped sensor update (1-based line number)
    ParseFailed { line: usize, source: serde_json::Error },
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::ReadFailed(e) => {
                write!(f, "Failed to read capture: {}", e)
            }
            CaptureError::ParseFailed { line, source } => {
                write!(f, "Invalid capture line {}: {}", line, source)
            }
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CaptureError::ReadFailed(e) => Some(e),
            CaptureError::ParseFailed { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_error_display() {
        let err = SensorError::SubscribeFailed {
            sensor: "heart rate",
            reason: "denied".to_string(),
        };
        assert!(err.to_string().contains("heart rate"));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_store_error_not_found() {
        let err = StoreError::NotFound(42);
        assert_eq!(err.to_string(), "Session 42 not found");
    }

    #[test]
    fn test_store_error_chain() {
        use std::error::Error;
        let err = StoreError::Migration {
            version: 2,
            source: Box::new(StoreError::Engine(rusqlite::Error::InvalidQuery)),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("version 2"));
    }

    #[test]
    fn test_config_error_chain() {
        use std::error::Error;
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = ConfigError::ReadFailed(io_err);
        assert!(err.source().is_some());
    }
}
