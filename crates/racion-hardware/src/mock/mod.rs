//! Mock device implementations for testing and development.
//!
//! This module provides a simulated fingerprint reader that can be scripted
//! and inspected programmatically without physical hardware.

pub mod sensor;

// Re-export commonly used types
pub use sensor::{MockSensor, MockSensorHandle, Scorer, SensorCall};
