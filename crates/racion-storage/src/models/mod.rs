pub mod ration_event;
pub mod student;
pub mod terminal_config;

pub use ration_event::{DailyCounts, NewRationEvent, RationEvent};
pub use student::{AdminSeed, EnrollmentRequest, Student};
pub use terminal_config::TerminalConfig;

/// Map a domain validation failure on a stored column to a decode error.
pub(crate) fn decode_error(err: racion_core::Error) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}
