use chrono::NaiveDate;
use racion_core::RationType;
use thiserror::Error;

/// Storage-specific error types for the ration kiosk.
///
/// Conflicts the business layer recovers from (`DuplicateIdentity`,
/// `AlreadyExists`) are separate variants so callers never have to inspect
/// raw database errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Entity not found in database
    #[error("Entity not found: {entity_type} with {field}={value}")]
    NotFound {
        entity_type: String,
        field: String,
        value: String,
    },

    /// Enrollment conflict: the identity already has a roster entry or template
    #[error("Identity already enrolled: {0}")]
    DuplicateIdentity(String),

    /// Ledger conflict: the ration was already issued for that day
    #[error("Ration already issued: {identity} {ration_type} on {service_date}")]
    AlreadyExists {
        identity: String,
        service_date: NaiveDate,
        ration_type: RationType,
    },

    /// The terminal configuration row is absent or incomplete
    #[error("Missing terminal configuration: {0}")]
    MissingConfiguration(String),

    /// Persisted value does not map to a domain type
    #[error("Invalid stored value: {0}")]
    Domain(#[from] racion_core::Error),

    /// Data validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    pub(crate) fn not_found(entity_type: &str, field: &str, value: impl ToString) -> Self {
        Self::NotFound {
            entity_type: entity_type.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Whether a database error is a UNIQUE or PRIMARY KEY constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Whether a database error is a FOREIGN KEY constraint violation.
pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}
