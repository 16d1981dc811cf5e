use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Identity errors
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    // Enum code errors
    #[error("Invalid ration type code: {0}")]
    InvalidRationType(i64),

    #[error("Invalid sync state code: {0}")]
    InvalidSyncState(i64),

    #[error("Invalid role code: {0}")]
    InvalidRole(i64),

    // Schedule errors
    #[error("Invalid service window {start}..{end}: {reason}")]
    InvalidServiceWindow { start: u32, end: u32, reason: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing configuration key: {0}")]
    MissingConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
