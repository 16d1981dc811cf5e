//! Storage layer for the ration kiosk.
//!
//! This crate provides SQLite-backed persistence for the roster, fingerprint
//! templates, the ration ledger and the terminal configuration, along with
//! the [`RationAuthority`] that enforces one ration of each type per person
//! per day.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool manager with embedded migrations
//! - [`StudentRepository`], [`TemplateStore`], [`RationLedger`],
//!   [`ConfigRepository`] - Data access traits with SQLite implementations
//! - [`RationAuthority`] - Service window, roster and ledger checks
//! - [`transaction`] - Transaction-aware operations for atomic multistep writes
//!
//! # Core Concepts
//!
//! ## The ledger is the only shared write path
//!
//! Several kiosk tasks (and, on a shared database file, several processes)
//! may record rations at once, and there is no single in-process writer. The
//! `UNIQUE (identity, service_date, ration_type)` constraint on
//! `ration_events` is what prevents a double ration; application-level
//! checks are only a fast path in front of it.
//!
//! ## Natural keys
//!
//! People are keyed by their normalized [`Identity`](racion_core::Identity)
//! (a national ID body). Templates and ledger rows reference it directly.
//!
//! # Examples
//!
//! ## Enroll and Authorize
//!
//! ```no_run
//! use chrono::Local;
//! use racion_core::{Identity, ServiceSchedule};
//! use racion_storage::models::EnrollmentRequest;
//! use racion_storage::{Database, DatabaseConfig, RationAuthority, StudentRepository};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("racion.db")).await?;
//!
//! let identity = Identity::new("12345678")?;
//! let template = vec![0u8; 512]; // from the sensor
//! db.students()
//!     .enroll(&EnrollmentRequest::student(identity.clone(), "Ana Rojas", template).with_course("3B"))
//!     .await?;
//!
//! let authority = RationAuthority::new(db.pool().clone(), "TOTEM-01", ServiceSchedule::default());
//! let outcome = authority.process(&identity, &Local::now()).await?;
//! println!("{}", outcome.display_message());
//! # Ok(())
//! # }
//! ```
//!
//! ## Synchronization
//!
//! ```no_run
//! use racion_storage::{Database, RationLedger};
//!
//! # async fn example(db: Database) -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = db.ledger();
//! let pending = ledger.pending().await?;
//!
//! // ... upload `pending` to the central server ...
//!
//! let ids: Vec<i64> = pending.iter().map(|event| event.id).collect();
//! let flipped = ledger.mark_synced(&ids).await?;
//! println!("{flipped} rows synced");
//! # Ok(())
//! # }
//! ```
//!
//! # Security Considerations
//!
//! - Staff credential hashes are compared in constant time via the `subtle`
//!   crate and never serialized.
//! - All queries use parameterized statements via SQLx.
//! - The first administrator is created at runtime through
//!   [`Database::bootstrap_admin`], never through a migration.
//!
//! # Performance
//!
//! - Connection pooling with configurable limits (default: 10 max, 2 min)
//! - WAL mode with a busy timeout so concurrent ledger writers wait for the lock
//! - Indexes on `sync_state` and `service_date` for the sync and stats queries

pub mod authority;
pub mod connection;
pub mod error;
pub mod messages;
pub mod models;
pub mod repositories;
pub mod transaction;

pub use authority::{RationAuthority, RationOutcome};
pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use messages::DisplayMessages;
pub use models::{
    AdminSeed, DailyCounts, EnrollmentRequest, NewRationEvent, RationEvent, Student,
    TerminalConfig,
};
pub use repositories::{
    ConfigRepository, RationLedger, SqliteConfigRepository, SqliteRationLedger,
    SqliteStudentRepository, SqliteTemplateStore, StudentRepository, TemplateStore,
};
