//! Error types for fingerprint device initialization.
//!
//! Only bringing the device up can fail with an error. Once the worker is
//! running, every hardware problem is reported as a typed outcome
//! ([`CaptureOutcome`](crate::types::CaptureOutcome) or a negative score),
//! never as an error crossing the command queue.

/// Result type alias for device initialization.
pub type Result<T> = std::result::Result<T, InitError>;

/// Errors that can occur while starting the device worker.
///
/// These are non-fatal to the rest of the process: the worker stays alive in
/// the degraded state and answers every command with `NotInitialized`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    /// No fingerprint reader is attached.
    #[error("Device not found: {device}")]
    DeviceNotFound { device: String },

    /// The vendor SDK refused to initialize.
    #[error("SDK initialization failed (code {code}): {message}")]
    SdkInitFailed { code: i32, message: String },

    /// The device did not finish opening before the start timeout.
    #[error("Device did not become ready within {timeout_ms}ms")]
    StartTimeout { timeout_ms: u64 },

    /// The worker thread could not be spawned.
    #[error("Failed to spawn worker thread: {message}")]
    Spawn { message: String },
}

impl InitError {
    /// Create a new device not found error.
    pub fn device_not_found(device: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            device: device.into(),
        }
    }

    /// Create a new SDK initialization error.
    pub fn sdk_init_failed(code: i32, message: impl Into<String>) -> Self {
        Self::SdkInitFailed {
            code,
            message: message.into(),
        }
    }

    /// Create a new start timeout error.
    pub fn start_timeout(timeout_ms: u64) -> Self {
        Self::StartTimeout { timeout_ms }
    }

    /// Create a new spawn error.
    pub fn spawn(message: impl Into<String>) -> Self {
        Self::Spawn {
            message: message.into(),
        }
    }
}
