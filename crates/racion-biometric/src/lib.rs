//! Fingerprint identification for the ration kiosk.
//!
//! - [`TemplateCache`] holds the enrolled templates in memory as an
//!   immutable, sorted snapshot that is swapped on enrollment or removal.
//! - [`IdentificationEngine`] scores a live capture against every cached
//!   template through the [`DeviceWorker`](racion_hardware::DeviceWorker) and
//!   reports the best identity above a threshold.
//!
//! Identification is a linear scan: one match command per enrolled person.
//! That is fine for a single school's roster, and it is the first thing to
//! revisit if the enrolled population grows by orders of magnitude.

pub mod cache;
pub mod engine;

pub use cache::{TemplateCache, TemplateSnapshot};
pub use engine::{IdentificationEngine, IdentificationResult, best_match};
