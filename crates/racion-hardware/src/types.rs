//! Types exchanged between the device worker and its callers.

use serde::{Deserialize, Serialize};

/// Generic device information.
///
/// Reported by the SDK when the device opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name (e.g., "ZK9500", "MockSensor").
    pub name: String,

    /// Device model identifier.
    pub model: String,

    /// Optional device serial number.
    pub serial_number: Option<String>,

    /// Optional firmware version string.
    pub firmware_version: Option<String>,
}

impl DeviceInfo {
    /// Create a new DeviceInfo with required fields.
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            serial_number: None,
            firmware_version: None,
        }
    }

    /// Set the serial number.
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Set the firmware version.
    pub fn with_firmware_version(mut self, firmware_version: impl Into<String>) -> Self {
        self.firmware_version = Some(firmware_version.into());
        self
    }
}

/// Result of a capture command.
///
/// Every variant is a normal outcome. `NoFinger` covers both "nothing on the
/// sensor" and "timeout elapsed"; callers should simply prompt again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// A template was extracted from the finger on the sensor.
    Success(Vec<u8>),

    /// No finger was presented before the timeout.
    NoFinger,

    /// The SDK reported a failure other than "no finger".
    SensorError { code: i32, message: String },

    /// The worker is stopped or degraded and cannot reach the device.
    NotInitialized,
}

impl CaptureOutcome {
    /// Whether a template was captured.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, CaptureOutcome::Success(_))
    }

    /// Borrow the captured template, if any.
    #[must_use]
    pub fn template(&self) -> Option<&[u8]> {
        match self {
            CaptureOutcome::Success(template) => Some(template),
            _ => None,
        }
    }

    /// Take the captured template, if any.
    #[must_use]
    pub fn into_template(self) -> Option<Vec<u8>> {
        match self {
            CaptureOutcome::Success(template) => Some(template),
            _ => None,
        }
    }
}

/// Lifecycle state of the device worker.
///
/// ```text
/// Stopped -> Starting -> Ready
///                     -> Degraded
/// Ready | Degraded -> Stopped   (stop)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum WorkerState {
    Stopped = 0,
    Starting = 1,
    Ready = 2,
    /// Thread alive, device unavailable.
    Degraded = 3,
}

impl WorkerState {
    /// Convert from the atomic representation.
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerState::Starting,
            2 => WorkerState::Ready,
            3 => WorkerState::Degraded,
            _ => WorkerState::Stopped,
        }
    }
}
