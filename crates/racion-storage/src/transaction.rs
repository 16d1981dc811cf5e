//! Transaction-aware operations for atomic multistep writes.
//!
//! These functions accept a SQLite transaction reference, so several writes
//! can be grouped and committed together. Repositories use them for
//! enrollment (student + template) and for flipping a batch of ledger rows to
//! synced; callers can use them directly to compose their own transactions.
//!
//! # Usage Pattern
//!
//! ```no_run
//! use racion_core::Identity;
//! use racion_storage::models::EnrollmentRequest;
//! use racion_storage::{Database, transaction};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::in_memory().await?;
//! let request = EnrollmentRequest::student(Identity::new("12345678")?, "Ana Rojas", vec![1, 2, 3]);
//!
//! let mut tx = db.pool().begin().await?;
//! transaction::insert_student(&mut tx, &request).await?;
//! transaction::insert_template(&mut tx, &request.identity, &request.template).await?;
//!
//! // Both rows are written, or neither
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Atomic Guarantees
//!
//! If any operation returns an error, dropping the transaction rolls back
//! everything written through it.

use crate::error::{StorageError, StorageResult, is_foreign_key_violation, is_unique_violation};
use crate::models::EnrollmentRequest;
use racion_core::{Identity, SyncState};
use sqlx::{Sqlite, Transaction};

/// Insert a roster entry within a transaction
///
/// # Errors
///
/// Returns `DuplicateIdentity` if the identity is already enrolled.
pub async fn insert_student(
    tx: &mut Transaction<'_, Sqlite>,
    request: &EnrollmentRequest,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO students (identity, full_name, course, role)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(request.identity.as_str())
    .bind(&request.full_name)
    .bind(&request.course)
    .bind(request.role.to_i32())
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            StorageError::DuplicateIdentity(request.identity.to_string())
        } else {
            e.into()
        }
    })?;

    Ok(())
}

/// Store a template for an enrolled identity within a transaction
///
/// # Errors
///
/// Returns error if:
/// - The identity already has a template (`DuplicateIdentity`)
/// - The identity is not on the roster (`NotFound`)
/// - The template is empty (`Validation`)
pub async fn insert_template(
    tx: &mut Transaction<'_, Sqlite>,
    identity: &Identity,
    template: &[u8],
) -> StorageResult<()> {
    if template.is_empty() {
        return Err(StorageError::Validation(format!(
            "empty template for {identity}"
        )));
    }

    sqlx::query("INSERT INTO templates (identity, data) VALUES (?, ?)")
        .bind(identity.as_str())
        .bind(template)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::DuplicateIdentity(identity.to_string())
            } else if is_foreign_key_violation(&e) {
                StorageError::not_found("Student", "identity", identity)
            } else {
                e.into()
            }
        })?;

    Ok(())
}

/// Mark one ledger row as synchronized within a transaction
///
/// Returns the number of rows changed: 0 if the row does not exist or was
/// already synced.
pub async fn mark_event_synced(tx: &mut Transaction<'_, Sqlite>, id: i64) -> StorageResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE ration_events
        SET sync_state = ?
        WHERE id = ? AND sync_state = ?
        "#,
    )
    .bind(SyncState::Synced.to_i32())
    .bind(id)
    .bind(SyncState::Pending.to_i32())
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}
