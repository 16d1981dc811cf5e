use chrono::{DateTime, NaiveDate, Utc};
use racion_core::{Identity, RationType, SyncState};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use super::decode_error;

/// One issued ration, as recorded in the ledger.
///
/// # Database Schema
///
/// Maps to the `ration_events` table. `(identity, service_date, ration_type)`
/// is UNIQUE, which is what makes a second ration of the same type on the
/// same day impossible even for concurrent writers. Rows are never deleted;
/// the only mutation is flipping `sync_state` from pending to synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RationEvent {
    /// Auto-increment primary key
    pub id: i64,
    pub identity: Identity,
    /// Calendar day in the kiosk's local timezone
    pub service_date: NaiveDate,
    pub ration_type: RationType,
    pub terminal_id: String,
    /// Instant the ration was issued
    pub event_time: DateTime<Utc>,
    pub sync_state: SyncState,
}

impl RationEvent {
    pub fn is_pending(&self) -> bool {
        self.sync_state == SyncState::Pending
    }
}

impl<'r> FromRow<'r, SqliteRow> for RationEvent {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let identity: String = row.try_get("identity")?;
        let ration_type: i32 = row.try_get("ration_type")?;
        let sync_state: i32 = row.try_get("sync_state")?;

        Ok(Self {
            id: row.try_get("id")?,
            identity: Identity::new(&identity).map_err(decode_error)?,
            service_date: row.try_get("service_date")?,
            ration_type: RationType::from_i32(ration_type).map_err(decode_error)?,
            terminal_id: row.try_get("terminal_id")?,
            event_time: row.try_get("event_time")?,
            sync_state: SyncState::from_i32(sync_state).map_err(decode_error)?,
        })
    }
}

/// Ledger row to insert; always starts pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRationEvent {
    pub identity: Identity,
    pub service_date: NaiveDate,
    pub ration_type: RationType,
    pub terminal_id: String,
    pub event_time: DateTime<Utc>,
}

impl NewRationEvent {
    /// The stored row once the ledger assigned `id`.
    pub fn into_event(self, id: i64) -> RationEvent {
        RationEvent {
            id,
            identity: self.identity,
            service_date: self.service_date,
            ration_type: self.ration_type,
            terminal_id: self.terminal_id,
            event_time: self.event_time,
            sync_state: SyncState::Pending,
        }
    }
}

/// Rations served on one service date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCounts {
    pub service_date: NaiveDate,
    pub breakfasts: i64,
    pub lunches: i64,
}

impl DailyCounts {
    pub fn total(&self) -> i64 {
        self.breakfasts + self.lunches
    }
}
