//! Boundary to the vendor fingerprint SDK.
//!
//! The SDK is blocking and non-reentrant. An implementation of
//! [`FingerprintSdk`] is created inside the worker thread by an
//! [`SdkFactory`] and never leaves it, so it does not need to be `Send`.

use crate::{error::Result, types::DeviceInfo};
use std::sync::Arc;

/// Result of a single acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquire {
    /// A template was extracted. An empty template counts as no finger.
    Captured(Vec<u8>),
    /// Nothing on the sensor right now.
    NoFinger,
    /// Any other SDK failure.
    Failed { code: i32, message: String },
}

/// Blocking fingerprint SDK operations.
///
/// Every method may block the calling thread for as long as the hardware
/// needs. Only the device worker calls these.
pub trait FingerprintSdk {
    /// Open the device and prepare the matching context.
    fn open(&mut self) -> Result<DeviceInfo>;

    /// Try once to read a finger and extract a template.
    fn acquire(&mut self) -> Acquire;

    /// Similarity between two templates on the vendor scale, `-1` on failure.
    fn match_templates(&mut self, first: &[u8], second: &[u8]) -> i32;

    /// Release the device. Called exactly once after a successful `open`.
    fn close(&mut self);
}

impl<T: FingerprintSdk + ?Sized> FingerprintSdk for Box<T> {
    fn open(&mut self) -> Result<DeviceInfo> {
        (**self).open()
    }

    fn acquire(&mut self) -> Acquire {
        (**self).acquire()
    }

    fn match_templates(&mut self, first: &[u8], second: &[u8]) -> i32 {
        (**self).match_templates(first, second)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Constructor for the SDK handle, invoked on the worker thread at each start.
pub type SdkFactory = Arc<dyn Fn() -> Box<dyn FingerprintSdk> + Send + Sync>;
