#![allow(async_fn_in_trait)]

use crate::error::{StorageError, StorageResult, is_unique_violation};
use crate::models::{DailyCounts, NewRationEvent, RationEvent};
use crate::transaction;
use chrono::NaiveDate;
use racion_core::{Identity, RationType, SyncState};
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Append-only record of issued rations
///
/// The ledger enforces at most one row per `(identity, service_date,
/// ration_type)` through a UNIQUE constraint. [`insert`](RationLedger::insert)
/// is the authoritative check; [`exists`](RationLedger::exists) is only a
/// fast path for the common case.
pub trait RationLedger: Send + Sync {
    /// Whether a ration was already issued
    async fn exists(
        &self,
        identity: &Identity,
        service_date: NaiveDate,
        ration_type: RationType,
    ) -> StorageResult<bool>;

    /// Record an issued ration, returning the stored row.
    ///
    /// Fails with `AlreadyExists` if a concurrent writer got there first.
    async fn insert(&self, event: &NewRationEvent) -> StorageResult<RationEvent>;

    /// Rows not yet synchronized, oldest first
    async fn pending(&self) -> StorageResult<Vec<RationEvent>>;

    /// Flip the given rows to synced in one transaction.
    ///
    /// Unknown or already synced ids are skipped. Returns the number of rows
    /// changed.
    async fn mark_synced(&self, ids: &[i64]) -> StorageResult<u64>;

    /// Most recent rows, newest first
    async fn recent(&self, limit: i64) -> StorageResult<Vec<RationEvent>>;

    /// Breakfast and lunch totals for one service date
    async fn daily_counts(&self, service_date: NaiveDate) -> StorageResult<DailyCounts>;
}

/// SQLite implementation of RationLedger
#[derive(Debug, Clone)]
pub struct SqliteRationLedger {
    pool: SqlitePool,
}

impl SqliteRationLedger {
    /// Create a new SQLite ration ledger
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl RationLedger for SqliteRationLedger {
    async fn exists(
        &self,
        identity: &Identity,
        service_date: NaiveDate,
        ration_type: RationType,
    ) -> StorageResult<bool> {
        let result: (i64,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM ration_events
                WHERE identity = ? AND service_date = ? AND ration_type = ?
            )
            "#,
        )
        .bind(identity.as_str())
        .bind(service_date)
        .bind(ration_type.to_i32())
        .fetch_one(&self.pool)
        .await?;

        Ok(result.0 != 0)
    }

    async fn insert(&self, event: &NewRationEvent) -> StorageResult<RationEvent> {
        let result = sqlx::query(
            r#"
            INSERT INTO ration_events
                (identity, service_date, ration_type, terminal_id, event_time, sync_state)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.identity.as_str())
        .bind(event.service_date)
        .bind(event.ration_type.to_i32())
        .bind(&event.terminal_id)
        .bind(event.event_time)
        .bind(SyncState::Pending.to_i32())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::AlreadyExists {
                    identity: event.identity.to_string(),
                    service_date: event.service_date,
                    ration_type: event.ration_type,
                }
            } else {
                e.into()
            }
        })?;

        let id = result.last_insert_rowid();
        info!(
            id,
            identity = %event.identity,
            ration = %event.ration_type,
            date = %event.service_date,
            "Ration recorded"
        );

        Ok(event.clone().into_event(id))
    }

    async fn pending(&self) -> StorageResult<Vec<RationEvent>> {
        let events = sqlx::query_as::<_, RationEvent>(
            r#"
            SELECT id, identity, service_date, ration_type, terminal_id, event_time, sync_state
            FROM ration_events
            WHERE sync_state = ?
            ORDER BY id ASC
            "#,
        )
        .bind(SyncState::Pending.to_i32())
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn mark_synced(&self, ids: &[i64]) -> StorageResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut changed = 0;
        for &id in ids {
            changed += transaction::mark_event_synced(&mut tx, id).await?;
        }
        tx.commit().await?;

        debug!(requested = ids.len(), changed, "Marked events synced");
        Ok(changed)
    }

    async fn recent(&self, limit: i64) -> StorageResult<Vec<RationEvent>> {
        let events = sqlx::query_as::<_, RationEvent>(
            r#"
            SELECT id, identity, service_date, ration_type, terminal_id, event_time, sync_state
            FROM ration_events
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn daily_counts(&self, service_date: NaiveDate) -> StorageResult<DailyCounts> {
        let rows: Vec<(i32, i64)> = sqlx::query_as(
            r#"
            SELECT ration_type, COUNT(*)
            FROM ration_events
            WHERE service_date = ?
            GROUP BY ration_type
            "#,
        )
        .bind(service_date)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = DailyCounts {
            service_date,
            breakfasts: 0,
            lunches: 0,
        };
        for (ration_type, count) in rows {
            match RationType::from_i32(ration_type)? {
                RationType::Breakfast => counts.breakfasts = count,
                RationType::Lunch => counts.lunches = count,
            }
        }

        Ok(counts)
    }
}
