//! Kiosk orchestration: startup, the identification loop and operator commands.

use crate::error::{KioskError, Result};
use crate::events::{
    ErrorCode, EventRecord, KioskCommand, KioskEvent, KioskStatus, StatsData, TicketData,
    TicketStatus,
};
use crate::settings::KioskSettings;
use chrono::{DateTime, FixedOffset, Local};
use racion_biometric::{IdentificationEngine, IdentificationResult, TemplateCache};
use racion_core::Identity;
use racion_hardware::mock::MockSensorHandle;
use racion_hardware::{CaptureOutcome, DeviceWorker};
use racion_storage::{
    ConfigRepository, Database, EnrollmentRequest, RationAuthority, RationEvent, RationLedger,
    RationOutcome, StorageError, StorageResult, StudentRepository, TemplateStore, TerminalConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Source of the local time used for service windows and stats.
pub type Clock = Arc<dyn Fn() -> DateTime<FixedOffset> + Send + Sync>;

/// One ration kiosk: a fingerprint reader, a template cache and the ledger.
///
/// # Lifecycle
///
/// 1. [`open`](Self::open) reads the terminal configuration (fatal if
///    missing), starts the device worker (a failure only degrades the
///    kiosk) and loads every template into the cache.
/// 2. [`run`](Self::run) alternates between operator commands and short
///    capture slices until stopped.
/// 3. [`shutdown`](Self::shutdown) stops the worker and closes the pool.
///
/// Progress events (reader status, enrollment prompts) are sent on the
/// channel returned by `open`; the loop sends every other event there too.
pub struct Kiosk {
    settings: KioskSettings,
    db: Database,
    terminal: TerminalConfig,
    worker: Arc<DeviceWorker>,
    engine: IdentificationEngine,
    cache: TemplateCache,
    authority: RationAuthority,
    clock: Clock,
    emulator: Option<MockSensorHandle>,
    events: mpsc::UnboundedSender<KioskEvent>,
}

impl Kiosk {
    /// Open the database named in `settings` and start the kiosk.
    ///
    /// # Errors
    ///
    /// Fails if the database cannot be opened or the terminal configuration
    /// is missing. A reader that cannot be opened is not an error.
    pub async fn open(
        settings: KioskSettings,
        worker: Arc<DeviceWorker>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<KioskEvent>)> {
        let db = Database::new(settings.database_config()).await?;
        Self::with_database(settings, db, worker).await
    }

    /// Start the kiosk over an already opened database.
    pub async fn with_database(
        settings: KioskSettings,
        db: Database,
        worker: Arc<DeviceWorker>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<KioskEvent>)> {
        let terminal = db.config().require().await?;

        let starting = Arc::clone(&worker);
        let started = tokio::task::spawn_blocking(move || starting.start())
            .await
            .map_err(|e| KioskError::Internal(format!("worker start task failed: {e}")))?;
        let status = match started {
            Ok(()) => KioskStatus::Ready,
            Err(e) => {
                warn!(error = %e, "Fingerprint reader unavailable, running degraded");
                KioskStatus::DeviceUnavailable
            }
        };

        let cache = TemplateCache::from_templates(db.templates().load_all().await?);
        let authority = RationAuthority::new(
            db.pool().clone(),
            terminal.terminal_id.clone(),
            settings.schedule.clone(),
        );

        info!(
            terminal_id = %terminal.terminal_id,
            templates = cache.len(),
            reader = ?status,
            "Kiosk opened"
        );

        let (events, receiver) = mpsc::unbounded_channel();
        let kiosk = Self {
            settings,
            db,
            terminal,
            engine: IdentificationEngine::new(Arc::clone(&worker)),
            worker,
            cache,
            authority,
            clock: Arc::new(|| Local::now().fixed_offset()),
            emulator: None,
            events,
        };
        kiosk.emit(KioskEvent::status(status));

        Ok((kiosk, receiver))
    }

    /// Replace the clock.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<FixedOffset> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Accept `touch` commands by queueing captures on this mock sensor.
    pub fn with_emulator(mut self, handle: MockSensorHandle) -> Self {
        self.emulator = Some(handle);
        self
    }

    pub fn settings(&self) -> &KioskSettings {
        &self.settings
    }

    pub fn terminal(&self) -> &TerminalConfig {
        &self.terminal
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn worker(&self) -> &Arc<DeviceWorker> {
        &self.worker
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    /// Another sender on the event channel, for front ends that report
    /// their own failures (e.g. an unparsable command line) in-band.
    pub fn event_sender(&self) -> mpsc::UnboundedSender<KioskEvent> {
        self.events.clone()
    }

    /// One capture slice: capture, identify, authorize.
    ///
    /// Returns `None` when no finger was placed before the scan timeout.
    pub async fn serve_once(&self) -> Option<KioskEvent> {
        let template = match self.worker.submit_capture(self.settings.scan_timeout).await {
            CaptureOutcome::Success(template) => template,
            CaptureOutcome::NoFinger => return None,
            CaptureOutcome::SensorError { code, message } => {
                warn!(code, %message, "Sensor error during capture");
                return Some(KioskEvent::status(KioskStatus::DeviceUnavailable));
            }
            CaptureOutcome::NotInitialized => {
                return Some(KioskEvent::status(KioskStatus::DeviceUnavailable));
            }
        };

        self.emit(KioskEvent::status(KioskStatus::ProcessingFinger));

        let snapshot = self.cache.snapshot();
        let identity = match self
            .engine
            .identify_async(&template, &snapshot, self.settings.match_threshold)
            .await
        {
            IdentificationResult::Identified { identity, .. } => identity,
            IdentificationResult::NoMatch => return Some(KioskEvent::NoMatch),
        };

        match self.authorize(&identity).await {
            Ok(event) => Some(event),
            Err(e) => {
                error!(%identity, error = %e, "Ration could not be recorded");
                Some(KioskEvent::error(ErrorCode::DbError))
            }
        }
    }

    async fn authorize(&self, identity: &Identity) -> StorageResult<KioskEvent> {
        let now = (self.clock)();
        let outcome = self.authority.process(identity, &now).await?;
        let student = self.db.students().find_by_identity(identity).await?;

        let (nombre, curso) = match student {
            Some(student) => (Some(student.full_name), student.course),
            None => (None, None),
        };
        let mut data = TicketData {
            run: identity.to_string(),
            nombre,
            curso,
            racion: None,
            mensaje: outcome.display_message().to_string(),
        };

        let status = match &outcome {
            RationOutcome::Approved(event) => {
                data.racion = Some(event.ration_type.display_name().to_string());
                TicketStatus::Approved
            }
            RationOutcome::RejectedDouble { ration_type } => {
                data.racion = Some(ration_type.display_name().to_string());
                TicketStatus::RejectedDouble
            }
            RationOutcome::RejectedOutsideHours => TicketStatus::RejectedTime,
            RationOutcome::RejectedUnknownIdentity => TicketStatus::RejectedUnknown,
        };

        Ok(KioskEvent::Ticket { status, data })
    }

    /// Execute one operator command and return its result event.
    pub async fn handle_command(&self, command: KioskCommand) -> KioskEvent {
        debug!(?command, "Command received");
        match command {
            KioskCommand::Enroll { run, nombre, curso } => self.enroll(&run, &nombre, curso).await,
            KioskCommand::GetRecent => match self.recent().await {
                Ok(rows) => KioskEvent::RecentData {
                    data: rows.iter().map(EventRecord::from).collect(),
                },
                Err(e) => storage_failure(ErrorCode::DbError, &e),
            },
            KioskCommand::GetUnsynced => match self.pending().await {
                Ok(rows) => KioskEvent::SyncData {
                    data: rows.iter().map(EventRecord::from).collect(),
                },
                Err(e) => storage_failure(ErrorCode::DbError, &e),
            },
            KioskCommand::MarkSynced { ids } => match self.mark_synced(&ids).await {
                Ok(_) => KioskEvent::status(KioskStatus::SyncMarkedOk),
                Err(e) => storage_failure(ErrorCode::SyncMarkFailed, &e),
            },
            KioskCommand::Stats => {
                let today = (self.clock)().date_naive();
                match self.db.ledger().daily_counts(today).await {
                    Ok(counts) => KioskEvent::Stats {
                        data: StatsData::from(counts),
                    },
                    Err(e) => storage_failure(ErrorCode::DbError, &e),
                }
            }
            KioskCommand::Touch { template } => match &self.emulator {
                Some(handle) => {
                    handle.queue_capture(template.into_bytes());
                    KioskEvent::status(KioskStatus::TouchQueued)
                }
                None => KioskEvent::error(ErrorCode::NotEmulated),
            },
            KioskCommand::Stop => KioskEvent::status(KioskStatus::Stopped),
        }
    }

    /// Capture a fresh template and enroll `run`.
    ///
    /// Sends a `place_finger_enroll` prompt before the capture starts. On
    /// success the template is usable for identification immediately.
    pub async fn enroll(&self, run: &str, full_name: &str, course: Option<String>) -> KioskEvent {
        let identity = match Identity::new(run) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(run, error = %e, "Enrollment rejected");
                return KioskEvent::error(ErrorCode::InvalidRun);
            }
        };
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return KioskEvent::error(ErrorCode::MissingName);
        }

        match self.db.students().exists(&identity).await {
            Ok(false) => {}
            Ok(true) => return KioskEvent::error(ErrorCode::AlreadyEnrolled),
            Err(e) => return storage_failure(ErrorCode::DbError, &e),
        }

        self.emit(KioskEvent::status(KioskStatus::PlaceFingerEnroll));

        let template = match self.worker.submit_capture(self.settings.capture_timeout).await {
            CaptureOutcome::Success(template) => template,
            CaptureOutcome::NoFinger => return KioskEvent::error(ErrorCode::EnrollTimeout),
            CaptureOutcome::SensorError { code, message } => {
                warn!(code, %message, "Sensor error during enrollment");
                return KioskEvent::error(ErrorCode::SensorError);
            }
            CaptureOutcome::NotInitialized => {
                return KioskEvent::status(KioskStatus::DeviceUnavailable);
            }
        };

        let mut request = EnrollmentRequest::student(identity, full_name, template);
        if let Some(course) = course.filter(|c| !c.trim().is_empty()) {
            request = request.with_course(course.trim());
        }

        match self.db.students().enroll(&request).await {
            Ok(student) => {
                self.cache.insert(student.identity, request.template);
                KioskEvent::status(KioskStatus::EnrollSuccess)
            }
            Err(StorageError::DuplicateIdentity(_)) => KioskEvent::error(ErrorCode::AlreadyEnrolled),
            Err(e) => storage_failure(ErrorCode::DbSaveFailed, &e),
        }
    }

    /// Delete a template from storage and the cache. The student and their
    /// ledger history are kept.
    pub async fn remove_template(&self, identity: &Identity) -> StorageResult<()> {
        self.db.templates().remove(identity).await?;
        self.cache.remove(identity);
        Ok(())
    }

    /// Ledger rows not yet synchronized, oldest first.
    pub async fn pending(&self) -> StorageResult<Vec<RationEvent>> {
        self.db.ledger().pending().await
    }

    /// Flip ledger rows to synced; returns how many changed.
    pub async fn mark_synced(&self, ids: &[i64]) -> StorageResult<u64> {
        self.db.ledger().mark_synced(ids).await
    }

    /// Most recent ledger rows, newest first.
    pub async fn recent(&self) -> StorageResult<Vec<RationEvent>> {
        self.db.ledger().recent(self.settings.recent_limit).await
    }

    /// Serve until a `stop` command arrives or `shutdown` turns true.
    ///
    /// Commands are read between capture slices, so they wait at most one
    /// scan timeout. After every finger read the loop pauses for the
    /// cooldown. Dropping the shutdown sender also stops the loop. Closing
    /// the command channel does not.
    pub async fn run(
        &self,
        mut commands: mpsc::UnboundedReceiver<KioskCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut commands_open = true;
        let mut reader_status = if self.worker.is_ready() {
            KioskStatus::Ready
        } else {
            KioskStatus::DeviceUnavailable
        };

        info!("Kiosk loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            while commands_open {
                match commands.try_recv() {
                    Ok(KioskCommand::Stop) => {
                        info!("Stop command received");
                        return Ok(());
                    }
                    Ok(command) => {
                        let event = self.handle_command(command).await;
                        self.emit(event);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        debug!("Command channel closed");
                        commands_open = false;
                    }
                }
            }

            match self.serve_once().await {
                None => {
                    if reader_status != KioskStatus::Ready {
                        reader_status = KioskStatus::Ready;
                        self.emit(KioskEvent::status(reader_status));
                    }
                }
                Some(KioskEvent::Status { status }) => {
                    if status != reader_status {
                        reader_status = status;
                        self.emit(KioskEvent::status(status));
                    }
                    // Degraded captures return at once
                    if pause(self.settings.scan_timeout, &mut shutdown).await {
                        break;
                    }
                }
                Some(event) => {
                    self.emit(event);
                    if pause(self.settings.cooldown, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        info!("Kiosk loop stopped");
        Ok(())
    }

    /// Stop the worker and close the pool. Safe to call more than once.
    pub async fn shutdown(&self) {
        let worker = Arc::clone(&self.worker);
        if let Err(e) = tokio::task::spawn_blocking(move || worker.stop()).await {
            error!(error = %e, "Worker stop task failed");
        }
        self.db.close().await;
        self.emit(KioskEvent::status(KioskStatus::Stopped));
        info!("Kiosk shut down");
    }

    fn emit(&self, event: KioskEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

impl std::fmt::Debug for Kiosk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kiosk")
            .field("terminal", &self.terminal)
            .field("worker", &self.worker.state())
            .field("templates", &self.cache.len())
            .field("emulated", &self.emulator.is_some())
            .finish()
    }
}

fn storage_failure(code: ErrorCode, err: &StorageError) -> KioskEvent {
    error!(error = %err, ?code, "Storage operation failed");
    KioskEvent::error(code)
}

/// Sleep unless shutdown is requested first; returns true on shutdown.
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
