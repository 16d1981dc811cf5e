use crate::error::{StorageError, StorageResult};
use crate::messages::DisplayMessages;
use crate::models::{NewRationEvent, RationEvent};
use crate::repositories::{
    RationLedger, SqliteRationLedger, SqliteStudentRepository, StudentRepository,
};
use chrono::{DateTime, Local, TimeZone, Utc};
use racion_core::{Identity, RationType, ServiceSchedule};
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Result of asking for a ration. Rejections are outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RationOutcome {
    /// Ration issued and recorded in the ledger
    Approved(RationEvent),
    /// This ration type was already issued to the identity today
    RejectedDouble { ration_type: RationType },
    /// No service window covers the current hour
    RejectedOutsideHours,
    /// The identity is not on the roster
    RejectedUnknownIdentity,
}

impl RationOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, RationOutcome::Approved(_))
    }

    /// Text for the kiosk screen.
    pub fn display_message(&self) -> &'static str {
        match self {
            RationOutcome::Approved(_) => DisplayMessages::RATION_APPROVED,
            RationOutcome::RejectedDouble { .. } => DisplayMessages::RATION_ALREADY_ISSUED,
            RationOutcome::RejectedOutsideHours => DisplayMessages::OUTSIDE_SERVICE_HOURS,
            RationOutcome::RejectedUnknownIdentity => DisplayMessages::IDENTITY_NOT_ENROLLED,
        }
    }
}

/// Turns a resolved identity into an issued or rejected ration.
///
/// # Decision Flow
///
/// Checks run in a fixed order and stop at the first rejection:
///
/// 1. **Service window**: the local hour selects breakfast or lunch; no
///    window → `RejectedOutsideHours` without touching the ledger
/// 2. **Roster**: identity must be enrolled → otherwise `RejectedUnknownIdentity`
/// 3. **Ledger lookup**: already issued today → `RejectedDouble`
/// 4. **Insert**: write a pending ledger row → `Approved`
///
/// The lookup in step 3 is only a fast path. Two kiosks (or two tasks) can
/// both pass it; the ledger's UNIQUE constraint then rejects the second
/// insert and that conflict is reported as `RejectedDouble`.
///
/// The service date is the calendar day of `now` in its own timezone, so
/// callers pass local time.
///
/// # Examples
///
/// ```no_run
/// use chrono::Local;
/// use racion_core::{Identity, ServiceSchedule};
/// use racion_storage::{Database, RationAuthority};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let db = Database::in_memory().await?;
/// let authority = RationAuthority::new(db.pool().clone(), "TOTEM-01", ServiceSchedule::default());
///
/// let outcome = authority.process(&Identity::new("12345678")?, &Local::now()).await?;
/// println!("{}", outcome.display_message());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RationAuthority {
    students: SqliteStudentRepository,
    ledger: SqliteRationLedger,
    terminal_id: String,
    schedule: ServiceSchedule,
}

impl RationAuthority {
    pub fn new(pool: SqlitePool, terminal_id: impl Into<String>, schedule: ServiceSchedule) -> Self {
        Self {
            students: SqliteStudentRepository::new(pool.clone()),
            ledger: SqliteRationLedger::new(pool),
            terminal_id: terminal_id.into(),
            schedule,
        }
    }

    pub fn terminal_id(&self) -> &str {
        &self.terminal_id
    }

    pub fn schedule(&self) -> &ServiceSchedule {
        &self.schedule
    }

    /// Decide and record a ration for `identity` at `now`.
    ///
    /// # Errors
    ///
    /// Only storage failures are errors. A uniqueness conflict on insert is
    /// reported as `Ok(RejectedDouble)`.
    pub async fn process<Tz: TimeZone>(
        &self,
        identity: &Identity,
        now: &DateTime<Tz>,
    ) -> StorageResult<RationOutcome> {
        let Some((ration_type, service_date)) = self.schedule.resolve(now) else {
            debug!(%identity, "Outside service hours");
            return Ok(RationOutcome::RejectedOutsideHours);
        };

        if !self.students.exists(identity).await? {
            debug!(%identity, "Identity not on roster");
            return Ok(RationOutcome::RejectedUnknownIdentity);
        }

        if self.ledger.exists(identity, service_date, ration_type).await? {
            info!(%identity, ration = %ration_type, date = %service_date, "Double ration rejected");
            return Ok(RationOutcome::RejectedDouble { ration_type });
        }

        let event = NewRationEvent {
            identity: identity.clone(),
            service_date,
            ration_type,
            terminal_id: self.terminal_id.clone(),
            event_time: now.with_timezone(&Utc),
        };

        match self.ledger.insert(&event).await {
            Ok(stored) => Ok(RationOutcome::Approved(stored)),
            Err(StorageError::AlreadyExists { .. }) => {
                info!(%identity, ration = %ration_type, date = %service_date, "Concurrent double ration rejected");
                Ok(RationOutcome::RejectedDouble { ration_type })
            }
            Err(e) => Err(e),
        }
    }

    /// [`process`](Self::process) at the current local time.
    pub async fn process_now(&self, identity: &Identity) -> StorageResult<RationOutcome> {
        self.process(identity, &Local::now()).await
    }
}
