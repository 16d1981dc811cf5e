use racion_hardware::InitError;
use racion_storage::StorageError;
use thiserror::Error;

/// Failures that stop the kiosk from starting or serving.
///
/// Business rejections and per-request storage failures never surface here;
/// they become [`KioskEvent`](crate::KioskEvent)s.
#[derive(Debug, Error)]
pub enum KioskError {
    /// Database could not be opened, or the terminal configuration is missing
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Fingerprint reader failed to start
    #[error("Device error: {0}")]
    Device(#[from] InitError),

    /// An environment or command-line setting has an invalid value
    #[error("Invalid setting {key}: {message}")]
    Settings { key: String, message: String },

    /// A protocol line could not be parsed or encoded
    #[error("Protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl KioskError {
    pub(crate) fn settings(key: &str, message: impl Into<String>) -> Self {
        Self::Settings {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, KioskError>;
