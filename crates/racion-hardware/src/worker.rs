//! Device worker: the single owner of the fingerprint reader.
//!
//! The worker runs one dedicated OS thread that creates the SDK handle,
//! opens the device and then serves commands from an unbounded queue, one
//! at a time and strictly in arrival order. Callers never touch the SDK;
//! they submit a command and receive a [`Pending`] handle for its result.
//!
//! # Failure handling
//!
//! - A device that fails to open leaves the worker *degraded*: the thread
//!   keeps draining the queue and answers every command with
//!   `NotInitialized` (or `-1` for matches).
//! - [`DeviceWorker::stop`] rejects every command still queued, waits for
//!   the one in progress, releases the device and joins the thread.
//! - If the thread panics mid-command, unwinding drops the queue and every
//!   result sink, so blocked callers wake up with the unresolved value, and
//!   the device is still closed.

use crate::error::{InitError, Result};
use crate::pending::Pending;
use crate::sdk::{Acquire, FingerprintSdk, SdkFactory};
use crate::types::{CaptureOutcome, DeviceInfo, WorkerState};
use racion_core::constants::{
    DEFAULT_CAPTURE_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_START_TIMEOUT_MS, MATCH_ERROR,
};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{RecvTimeoutError, SyncSender, sync_channel};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

/// Worker timing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Delay between sensor polls while waiting for a finger
    pub poll_interval: Duration,

    /// Capture timeout used by [`DeviceWorker::submit_default_capture`]
    pub capture_timeout: Duration,

    /// How long `start()` waits for the device to open
    pub start_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            capture_timeout: Duration::from_millis(DEFAULT_CAPTURE_TIMEOUT_MS),
            start_timeout: Duration::from_millis(DEFAULT_START_TIMEOUT_MS),
        }
    }
}

impl WorkerConfig {
    /// Set the sensor poll interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the default capture timeout.
    pub fn capture_timeout(mut self, timeout: Duration) -> Self {
        self.capture_timeout = timeout;
        self
    }

    /// Set the start handshake timeout.
    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }
}

/// Command consumed exactly once by the worker thread.
enum Command {
    Capture {
        timeout: Duration,
        respond: oneshot::Sender<CaptureOutcome>,
    },
    Match {
        first: Arc<[u8]>,
        second: Arc<[u8]>,
        respond: oneshot::Sender<i32>,
    },
    Stop,
}

impl Command {
    /// Resolve the command without touching the device.
    fn reject(self) {
        match self {
            Command::Capture { respond, .. } => {
                let _ = respond.send(CaptureOutcome::NotInitialized);
            }
            Command::Match { respond, .. } => {
                let _ = respond.send(MATCH_ERROR);
            }
            Command::Stop => {}
        }
    }
}

/// State readable from any thread without blocking.
#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    stopping: AtomicBool,
    device: Mutex<Option<DeviceInfo>>,
}

impl Shared {
    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Live worker thread and the sending half of its queue.
struct Running {
    sender: mpsc::UnboundedSender<Command>,
    thread: JoinHandle<()>,
}

/// Serializes every operation on a single fingerprint reader.
///
/// One instance is shared (usually behind an `Arc`) by every component that
/// needs the sensor. All methods take `&self` and are safe to call from any
/// thread.
///
/// # Examples
///
/// ```
/// use racion_hardware::mock::MockSensor;
/// use racion_hardware::{CaptureOutcome, DeviceWorker, WorkerConfig};
/// use std::time::Duration;
///
/// let (_sensor, handle) = MockSensor::new();
/// handle.queue_capture(vec![1, 2, 3]);
///
/// let sensor_handle = handle.clone();
/// let worker = DeviceWorker::new(WorkerConfig::default(), move || sensor_handle.sensor());
/// worker.start().unwrap();
///
/// let outcome = worker.capture_blocking(Duration::from_millis(200));
/// assert_eq!(outcome, CaptureOutcome::Success(vec![1, 2, 3]));
/// assert_eq!(worker.match_blocking(vec![1, 2, 3], vec![1, 2, 3]), 100);
///
/// worker.stop();
/// assert!(!worker.is_running());
/// ```
pub struct DeviceWorker {
    config: WorkerConfig,
    factory: SdkFactory,
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
    /// Held for the whole of `start` and `stop`
    lifecycle: Mutex<()>,
}

impl DeviceWorker {
    /// Create a stopped worker.
    ///
    /// `factory` is called on the worker thread each time the worker starts.
    pub fn new<F, S>(config: WorkerConfig, factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: FingerprintSdk + 'static,
    {
        let factory: SdkFactory = Arc::new(move || Box::new(factory()) as Box<dyn FingerprintSdk>);
        Self {
            config,
            factory,
            shared: Arc::new(Shared {
                state: AtomicU8::new(WorkerState::Stopped as u8),
                stopping: AtomicBool::new(false),
                device: Mutex::new(None),
            }),
            running: Mutex::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    /// Spawn the worker thread and open the device.
    ///
    /// Blocks until the device reports ready, fails, or the start timeout
    /// elapses. Calling it while the worker is running is a no-op. A worker
    /// whose thread died (SDK panic) is joined and started afresh.
    ///
    /// # Errors
    ///
    /// Returns the initialization failure. The worker thread stays alive in
    /// the degraded state, so callers may keep submitting commands.
    pub fn start(&self) -> Result<()> {
        let _lifecycle = lock(&self.lifecycle);
        let dead = {
            let mut running = lock(&self.running);
            match running.as_ref() {
                None => None,
                Some(live)
                    if !live.thread.is_finished()
                        && self.shared.state() != WorkerState::Stopped =>
                {
                    debug!("Device worker already running");
                    return Ok(());
                }
                Some(_) => running.take(),
            }
        };
        if let Some(dead) = dead {
            warn!("Device worker thread exited unexpectedly, restarting");
            drop(dead.sender);
            if dead.thread.join().is_err() {
                error!("Device worker thread had panicked");
            }
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = sync_channel(1);

        self.shared.stopping.store(false, Ordering::Release);
        self.shared.set_state(WorkerState::Starting);

        let factory = Arc::clone(&self.factory);
        let shared = Arc::clone(&self.shared);
        let poll_interval = self.config.poll_interval;

        let thread = thread::Builder::new()
            .name("racion-sensor".to_string())
            .spawn(move || run(factory, shared, poll_interval, receiver, ready_tx))
            .map_err(|e| {
                self.shared.set_state(WorkerState::Stopped);
                InitError::spawn(e.to_string())
            })?;

        *lock(&self.running) = Some(Running { sender, thread });

        match ready_rx.recv_timeout(self.config.start_timeout) {
            Ok(Ok(info)) => {
                info!(device = %info.name, model = %info.model, "Fingerprint device ready");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Fingerprint device unavailable, worker degraded: {}", e);
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                let timeout_ms = self.config.start_timeout.as_millis() as u64;
                warn!("Fingerprint device not ready after {}ms", timeout_ms);
                Err(InitError::start_timeout(timeout_ms))
            }
            Err(RecvTimeoutError::Disconnected) => {
                error!("Device worker thread exited during initialization");
                Err(InitError::sdk_init_failed(
                    -1,
                    "worker thread exited during initialization",
                ))
            }
        }
    }

    /// Stop the worker and release the device.
    ///
    /// Commands still queued are answered with `NotInitialized`; the command
    /// in progress finishes first. Safe to call repeatedly, and called on drop.
    pub fn stop(&self) {
        let _lifecycle = lock(&self.lifecycle);
        let Some(running) = lock(&self.running).take() else {
            return;
        };

        self.shared.stopping.store(true, Ordering::Release);
        // The thread may already be gone after a panic
        let _ = running.sender.send(Command::Stop);
        drop(running.sender);

        if running.thread.join().is_err() {
            error!("Device worker thread panicked; device released during unwind");
        }

        self.shared.set_state(WorkerState::Stopped);
        info!("Device worker stopped");
    }

    /// Queue a capture with an explicit timeout.
    pub fn submit_capture(&self, timeout: Duration) -> Pending<CaptureOutcome> {
        let (respond, pending) = Pending::channel();
        self.dispatch(Command::Capture { timeout, respond });
        pending
    }

    /// Queue a capture with the configured default timeout.
    pub fn submit_default_capture(&self) -> Pending<CaptureOutcome> {
        self.submit_capture(self.config.capture_timeout)
    }

    /// Queue a comparison of two templates.
    ///
    /// Resolves to the vendor similarity score, or `-1` on failure.
    pub fn submit_match(
        &self,
        first: impl Into<Arc<[u8]>>,
        second: impl Into<Arc<[u8]>>,
    ) -> Pending<i32> {
        let (respond, pending) = Pending::channel();
        self.dispatch(Command::Match {
            first: first.into(),
            second: second.into(),
            respond,
        });
        pending
    }

    /// Capture and wait on the calling thread.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async runtime; await
    /// [`submit_capture`](Self::submit_capture) there.
    pub fn capture_blocking(&self, timeout: Duration) -> CaptureOutcome {
        self.submit_capture(timeout).wait()
    }

    /// Match and wait on the calling thread.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async runtime.
    pub fn match_blocking(
        &self,
        first: impl Into<Arc<[u8]>>,
        second: impl Into<Arc<[u8]>>,
    ) -> i32 {
        self.submit_match(first, second).wait()
    }

    /// Whether the device is open and serving commands.
    pub fn is_ready(&self) -> bool {
        self.shared.state() == WorkerState::Ready
    }

    /// Whether the worker thread is alive (ready, degraded or starting).
    pub fn is_running(&self) -> bool {
        self.shared.state() != WorkerState::Stopped
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    /// Information reported by the device when it opened.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        lock(&self.shared.device).clone()
    }

    /// Worker configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    fn dispatch(&self, command: Command) {
        let running = lock(&self.running);
        match running.as_ref() {
            Some(running) => {
                if let Err(mpsc::error::SendError(command)) = running.sender.send(command) {
                    command.reject();
                }
            }
            None => command.reject(),
        }
    }
}

impl Drop for DeviceWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for DeviceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceWorker")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Closes the device when the worker thread leaves its loop, including on unwind.
struct DeviceGuard {
    sdk: Box<dyn FingerprintSdk>,
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        self.sdk.close();
        debug!("Fingerprint device closed");
    }
}

/// Resets the shared flags when the worker thread exits, including on unwind.
struct StateGuard {
    shared: Arc<Shared>,
}

impl Drop for StateGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("Device worker thread unwinding; pending commands are released");
        }
        *lock(&self.shared.device) = None;
        self.shared.set_state(WorkerState::Stopped);
    }
}

/// Marks the worker stopped when an SDK call panics, before the caller
/// waiting on that call is released.
struct InFlight<'a>(&'a Shared);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.set_state(WorkerState::Stopped);
        }
    }
}

/// Worker thread body.
fn run(
    factory: SdkFactory,
    shared: Arc<Shared>,
    poll_interval: Duration,
    mut receiver: mpsc::UnboundedReceiver<Command>,
    ready: SyncSender<Result<DeviceInfo>>,
) {
    // Drop order: device closes before the state is reset
    let _state = StateGuard {
        shared: Arc::clone(&shared),
    };

    let mut sdk = factory();
    let mut device = match sdk.open() {
        Ok(info) => {
            *lock(&shared.device) = Some(info.clone());
            shared.set_state(WorkerState::Ready);
            let _ = ready.send(Ok(info));
            Some(DeviceGuard { sdk })
        }
        Err(e) => {
            shared.set_state(WorkerState::Degraded);
            let _ = ready.send(Err(e));
            None
        }
    };
    drop(ready);

    while let Some(command) = receiver.blocking_recv() {
        if matches!(command, Command::Stop) {
            break;
        }
        if shared.stopping.load(Ordering::Acquire) {
            command.reject();
            continue;
        }

        match (command, device.as_mut()) {
            (Command::Capture { timeout, respond }, Some(device)) => {
                let _in_flight = InFlight(&shared);
                let outcome = capture(&mut *device.sdk, timeout, poll_interval);
                let _ = respond.send(outcome);
            }
            (Command::Match { first, second, respond }, Some(device)) => {
                let _in_flight = InFlight(&shared);
                let score = match_templates(&mut *device.sdk, &first, &second);
                let _ = respond.send(score);
            }
            (command, _) => command.reject(),
        }
    }

    receiver.close();
    let mut rejected = 0usize;
    while let Ok(command) = receiver.try_recv() {
        command.reject();
        rejected += 1;
    }
    if rejected > 0 {
        debug!("Rejected {} queued commands at shutdown", rejected);
    }
}

/// Poll the sensor until a template is read, the SDK fails, or `timeout` elapses.
fn capture(sdk: &mut dyn FingerprintSdk, timeout: Duration, poll_interval: Duration) -> CaptureOutcome {
    let deadline = Instant::now() + timeout;
    loop {
        match sdk.acquire() {
            Acquire::Captured(template) if !template.is_empty() => {
                trace!(len = template.len(), "Template captured");
                return CaptureOutcome::Success(template);
            }
            Acquire::Captured(_) | Acquire::NoFinger => {}
            Acquire::Failed { code, message } => {
                warn!(code, "Sensor error during capture: {}", message);
                return CaptureOutcome::SensorError { code, message };
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return CaptureOutcome::NoFinger;
        }
        thread::sleep(poll_interval.min(deadline - now));
    }
}

fn match_templates(sdk: &mut dyn FingerprintSdk, first: &[u8], second: &[u8]) -> i32 {
    if first.is_empty() || second.is_empty() {
        return MATCH_ERROR;
    }
    sdk.match_templates(first, second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSensor;
    use rstest::rstest;

    fn worker_with(handle: &crate::mock::MockSensorHandle) -> DeviceWorker {
        let handle = handle.clone();
        DeviceWorker::new(
            WorkerConfig::default().poll_interval(Duration::from_millis(10)),
            move || handle.sensor(),
        )
    }

    #[test]
    fn test_worker_config_builder() {
        let config = WorkerConfig::default()
            .poll_interval(Duration::from_millis(50))
            .capture_timeout(Duration::from_secs(1))
            .start_timeout(Duration::from_secs(2));

        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.capture_timeout, Duration::from_secs(1));
        assert_eq!(config.start_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_worker_config_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.capture_timeout, Duration::from_millis(3000));
        assert_eq!(config.start_timeout, Duration::from_millis(5000));
    }

    #[test]
    fn test_submit_before_start_is_not_initialized() {
        let (_sensor, handle) = MockSensor::new();
        let worker = worker_with(&handle);

        assert_eq!(worker.state(), WorkerState::Stopped);
        assert_eq!(
            worker.capture_blocking(Duration::from_millis(10)),
            CaptureOutcome::NotInitialized
        );
        assert_eq!(worker.match_blocking(vec![1], vec![1]), MATCH_ERROR);
        assert_eq!(handle.open_count(), 0);
    }

    #[test]
    fn test_start_is_idempotent() {
        let (_sensor, handle) = MockSensor::new();
        let worker = worker_with(&handle);

        worker.start().unwrap();
        worker.start().unwrap();

        assert!(worker.is_ready());
        assert_eq!(handle.open_count(), 1);
        assert_eq!(worker.device_info().unwrap().name, "MockSensor");
    }

    #[test]
    fn test_stop_is_idempotent_and_closes_device() {
        let (_sensor, handle) = MockSensor::new();
        let worker = worker_with(&handle);

        worker.start().unwrap();
        worker.stop();
        worker.stop();

        assert!(!worker.is_running());
        assert_eq!(handle.close_count(), 1);
        assert_eq!(worker.device_info(), None);
    }

    #[test]
    fn test_restart_reopens_device() {
        let (_sensor, handle) = MockSensor::new();
        let worker = worker_with(&handle);

        worker.start().unwrap();
        worker.stop();
        worker.start().unwrap();

        assert!(worker.is_ready());
        assert_eq!(handle.open_count(), 2);
        assert_eq!(handle.close_count(), 1);
    }

    #[test]
    fn test_empty_template_never_reaches_sdk() {
        let (_sensor, handle) = MockSensor::new();
        let worker = worker_with(&handle);
        worker.start().unwrap();

        assert_eq!(worker.match_blocking(Vec::new(), vec![1, 2]), MATCH_ERROR);
        assert_eq!(handle.match_count(), 0);
    }

    enum Step {
        Capture(&'static [u8]),
        NoFinger,
        Failure(i32, &'static str),
    }

    #[rstest]
    #[case::empty_capture_keeps_polling(
        &[Step::Capture(&[]), Step::Capture(&[5, 5])],
        CaptureOutcome::Success(vec![5, 5]),
        2
    )]
    #[case::finger_after_empty_poll(
        &[Step::NoFinger, Step::Capture(&[3])],
        CaptureOutcome::Success(vec![3]),
        2
    )]
    #[case::sensor_error_is_not_retried(
        &[Step::Failure(-8, "image quality too low"), Step::Capture(&[1])],
        CaptureOutcome::SensorError { code: -8, message: "image quality too low".to_string() },
        1
    )]
    fn test_capture_outcome(
        #[case] script: &[Step],
        #[case] expected: CaptureOutcome,
        #[case] acquires: usize,
    ) {
        let (_sensor, handle) = MockSensor::new();
        for step in script {
            match step {
                Step::Capture(template) => handle.queue_capture(template.to_vec()),
                Step::NoFinger => handle.queue_no_finger(),
                Step::Failure(code, message) => handle.queue_failure(*code, *message),
            }
        }
        let worker = worker_with(&handle);
        worker.start().unwrap();

        assert_eq!(worker.capture_blocking(Duration::from_millis(500)), expected);
        assert_eq!(handle.acquire_count(), acquires);
    }

    #[test]
    fn test_drop_stops_worker() {
        let (_sensor, handle) = MockSensor::new();
        {
            let worker = worker_with(&handle);
            worker.start().unwrap();
        }
        assert_eq!(handle.close_count(), 1);
    }
}
