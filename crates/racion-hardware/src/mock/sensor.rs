//! Mock fingerprint sensor for testing and the kiosk emulator.
//!
//! The sensor and its handle share state, so a test can script captures and
//! scores through the handle while the device worker drives the sensor on its
//! own thread. Every SDK call is instrumented: the handle reports how many
//! calls overlapped, the order they arrived in, and how often the device was
//! opened and closed.

use crate::error::{InitError, Result};
use crate::sdk::{Acquire, FingerprintSdk};
use crate::types::DeviceInfo;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Score function used for match calls.
pub type Scorer = Arc<dyn Fn(&[u8], &[u8]) -> i32 + Send + Sync>;

/// One recorded SDK call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorCall {
    Open,
    Acquire,
    Match { first: Vec<u8>, second: Vec<u8> },
    Close,
}

struct MockState {
    open_result: Mutex<Result<DeviceInfo>>,
    captures: Mutex<VecDeque<Acquire>>,
    scorer: Mutex<Scorer>,
    acquire_delay: Mutex<Duration>,
    match_delay: Mutex<Duration>,
    calls: Mutex<Vec<SensorCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    opens: AtomicUsize,
    closes: AtomicUsize,
    acquires: AtomicUsize,
    matches: AtomicUsize,
}

impl MockState {
    fn new(name: String) -> Self {
        Self {
            open_result: Mutex::new(Ok(
                DeviceInfo::new(name, "Mock Fingerprint Sensor v1.0").with_firmware_version("1.0.0")
            )),
            captures: Mutex::new(VecDeque::new()),
            scorer: Mutex::new(equality_scorer()),
            acquire_delay: Mutex::new(Duration::ZERO),
            match_delay: Mutex::new(Duration::ZERO),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            acquires: AtomicUsize::new(0),
            matches: AtomicUsize::new(0),
        }
    }

    /// Mark one SDK call as in flight until the guard drops.
    fn enter(&self, call: SensorCall) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        lock(&self.calls).push(call);
        InFlight { state: self }
    }
}

struct InFlight<'a> {
    state: &'a MockState,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scores identical templates 100 and anything else 0.
fn equality_scorer() -> Scorer {
    Arc::new(|first: &[u8], second: &[u8]| if first == second { 100 } else { 0 })
}

/// Mock fingerprint sensor.
///
/// Captures come from a script queue; an empty queue reads as "no finger".
///
/// # Examples
///
/// ```
/// use racion_hardware::mock::MockSensor;
/// use racion_hardware::sdk::{Acquire, FingerprintSdk};
///
/// let (mut sensor, handle) = MockSensor::new();
/// handle.queue_capture(vec![7, 7, 7]);
///
/// sensor.open().unwrap();
/// assert_eq!(sensor.acquire(), Acquire::Captured(vec![7, 7, 7]));
/// assert_eq!(sensor.acquire(), Acquire::NoFinger);
/// assert_eq!(sensor.match_templates(&[1], &[1]), 100);
/// ```
pub struct MockSensor {
    state: Arc<MockState>,
}

impl MockSensor {
    /// Create a mock sensor with the default name.
    ///
    /// Returns a tuple of (MockSensor, MockSensorHandle) where the handle
    /// scripts the sensor and reads its instrumentation.
    pub fn new() -> (Self, MockSensorHandle) {
        Self::with_name("MockSensor")
    }

    /// Create a mock sensor with a custom device name.
    pub fn with_name(name: impl Into<String>) -> (Self, MockSensorHandle) {
        let state = Arc::new(MockState::new(name.into()));
        let sensor = Self {
            state: Arc::clone(&state),
        };
        (sensor, MockSensorHandle { state })
    }
}

impl FingerprintSdk for MockSensor {
    fn open(&mut self) -> Result<DeviceInfo> {
        let _call = self.state.enter(SensorCall::Open);
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.open_result).clone()
    }

    fn acquire(&mut self) -> Acquire {
        let _call = self.state.enter(SensorCall::Acquire);
        self.state.acquires.fetch_add(1, Ordering::SeqCst);

        let delay = *lock(&self.state.acquire_delay);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        lock(&self.state.captures)
            .pop_front()
            .unwrap_or(Acquire::NoFinger)
    }

    fn match_templates(&mut self, first: &[u8], second: &[u8]) -> i32 {
        let _call = self.state.enter(SensorCall::Match {
            first: first.to_vec(),
            second: second.to_vec(),
        });
        self.state.matches.fetch_add(1, Ordering::SeqCst);

        let delay = *lock(&self.state.match_delay);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        // Cloned out so a panicking scorer cannot poison the lock
        let scorer = Arc::clone(&lock(&self.state.scorer));
        scorer(first, second)
    }

    fn close(&mut self) {
        let _call = self.state.enter(SensorCall::Close);
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Handle for scripting and inspecting a mock sensor.
///
/// Cloning the handle shares the same sensor state.
#[derive(Clone)]
pub struct MockSensorHandle {
    state: Arc<MockState>,
}

impl MockSensorHandle {
    /// Build another sensor bound to this handle's state.
    ///
    /// Used as the device worker's SDK factory.
    pub fn sensor(&self) -> MockSensor {
        MockSensor {
            state: Arc::clone(&self.state),
        }
    }

    /// Make the next `open` fail with `error`.
    pub fn fail_open(&self, error: InitError) {
        *lock(&self.state.open_result) = Err(error);
    }

    /// Queue a successful capture returning `template`.
    pub fn queue_capture(&self, template: impl Into<Vec<u8>>) {
        lock(&self.state.captures).push_back(Acquire::Captured(template.into()));
    }

    /// Queue one "no finger" poll.
    pub fn queue_no_finger(&self) {
        lock(&self.state.captures).push_back(Acquire::NoFinger);
    }

    /// Queue an SDK failure.
    pub fn queue_failure(&self, code: i32, message: impl Into<String>) {
        lock(&self.state.captures).push_back(Acquire::Failed {
            code,
            message: message.into(),
        });
    }

    /// Replace the score function.
    pub fn set_scorer<F>(&self, scorer: F)
    where
        F: Fn(&[u8], &[u8]) -> i32 + Send + Sync + 'static,
    {
        *lock(&self.state.scorer) = Arc::new(scorer);
    }

    /// Make every acquire call block for `delay`.
    pub fn set_acquire_delay(&self, delay: Duration) {
        *lock(&self.state.acquire_delay) = delay;
    }

    /// Make every match call block for `delay`.
    pub fn set_match_delay(&self, delay: Duration) {
        *lock(&self.state.match_delay) = delay;
    }

    /// Scripted captures not yet consumed.
    pub fn pending_captures(&self) -> usize {
        lock(&self.state.captures).len()
    }

    /// Highest number of SDK calls ever observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every SDK call in arrival order.
    pub fn calls(&self) -> Vec<SensorCall> {
        lock(&self.state.calls).clone()
    }

    /// Match calls in arrival order, as (first, second) template pairs.
    pub fn match_calls(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        lock(&self.state.calls)
            .iter()
            .filter_map(|call| match call {
                SensorCall::Match { first, second } => Some((first.clone(), second.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn acquire_count(&self) -> usize {
        self.state.acquires.load(Ordering::SeqCst)
    }

    pub fn match_count(&self) -> usize {
        self.state.matches.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MockSensorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSensorHandle")
            .field("pending_captures", &self.pending_captures())
            .field("open_count", &self.open_count())
            .field("close_count", &self.close_count())
            .finish()
    }
}
