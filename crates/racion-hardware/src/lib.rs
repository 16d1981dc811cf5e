//! Fingerprint reader access for the ration kiosk.
//!
//! The vendor fingerprint SDK is blocking and non-reentrant, while the kiosk
//! has several concurrent consumers (the identification loop, enrollment,
//! operator commands). This crate reconciles the two with an actor: a single
//! [`DeviceWorker`] thread exclusively owns the SDK handle and serves capture
//! and match commands one at a time, in FIFO order.
//!
//! # Submitting work
//!
//! Every command returns a [`Pending`] handle immediately. Async callers
//! await it; synchronous callers use the `*_blocking` helpers, which submit
//! and wait on the calling thread.
//!
//! ```no_run
//! use racion_hardware::{CaptureOutcome, DeviceWorker, WorkerConfig};
//! use racion_hardware::mock::MockSensor;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let (_sensor, handle) = MockSensor::new();
//! let worker = Arc::new(DeviceWorker::new(WorkerConfig::default(), move || handle.sensor()));
//!
//! // Degraded start is not fatal: commands resolve to NotInitialized
//! if let Err(e) = worker.start() {
//!     eprintln!("sensor unavailable: {e}");
//! }
//!
//! match worker.submit_capture(Duration::from_secs(3)).await {
//!     CaptureOutcome::Success(template) => {
//!         let score = worker.submit_match(template.clone(), template).await;
//!         println!("self score: {score}");
//!     }
//!     CaptureOutcome::NoFinger => println!("place your finger"),
//!     CaptureOutcome::SensorError { message, .. } => println!("sensor error: {message}"),
//!     CaptureOutcome::NotInitialized => println!("sensor unavailable"),
//! }
//! # }
//! ```
//!
//! # Guarantees
//!
//! - At most one SDK call is in flight at any time.
//! - Commands are served strictly in submission order; an in-flight capture
//!   is never interrupted.
//! - Capture timeouts resolve normally as `NoFinger`.
//! - Every handle resolves exactly once, even if the worker stops or its
//!   thread panics.
//!
//! # Mock Implementations
//!
//! [`mock::MockSensor`] is an instrumented SDK double used by the tests and
//! by the kiosk emulator.

pub mod error;
pub mod mock;
pub mod pending;
pub mod sdk;
pub mod types;
pub mod worker;

// Re-export commonly used types for convenience
pub use error::{InitError, Result};
pub use pending::{Pending, Unresolved};
pub use sdk::{Acquire, FingerprintSdk, SdkFactory};
pub use types::{CaptureOutcome, DeviceInfo, WorkerState};
pub use worker::{DeviceWorker, WorkerConfig};
