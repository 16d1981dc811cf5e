//! Completion handle for a submitted device command.

use crate::types::CaptureOutcome;
use racion_core::constants::MATCH_ERROR;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

/// Value a handle resolves to when its command was dropped unanswered.
///
/// This happens when the worker stops or its thread unwinds before serving
/// the command.
pub trait Unresolved {
    fn unresolved() -> Self;
}

impl Unresolved for CaptureOutcome {
    fn unresolved() -> Self {
        CaptureOutcome::NotInitialized
    }
}

impl Unresolved for i32 {
    fn unresolved() -> Self {
        MATCH_ERROR
    }
}

/// Handle to the result of a command submitted to the device worker.
///
/// Resolved exactly once by the worker thread. It can be awaited from async
/// code, waited on from a plain thread with [`Pending::wait`], or polled with
/// [`Pending::try_take`].
///
/// # Examples
///
/// ```
/// use racion_hardware::{CaptureOutcome, Pending};
///
/// let pending = Pending::ready(CaptureOutcome::NoFinger);
/// assert_eq!(pending.wait(), CaptureOutcome::NoFinger);
/// ```
#[derive(Debug)]
#[must_use = "a pending result does nothing unless waited on"]
pub struct Pending<T> {
    rx: oneshot::Receiver<T>,
}

impl<T: Unresolved> Pending<T> {
    /// Create a result sink and the handle it resolves.
    pub(crate) fn channel() -> (oneshot::Sender<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// Create an already-resolved handle.
    pub fn ready(value: T) -> Self {
        let (tx, pending) = Self::channel();
        // The receiver is alive in `pending`
        let _ = tx.send(value);
        pending
    }

    /// Block the current thread until the result is available.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context;
    /// await the handle there instead.
    pub fn wait(self) -> T {
        self.rx.blocking_recv().unwrap_or_else(|_| T::unresolved())
    }

    /// Take the result if it is already available.
    ///
    /// Once this returns `Some`, the handle is spent and must not be polled
    /// again.
    pub fn try_take(&mut self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(value) => Some(value),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(T::unresolved()),
        }
    }
}

impl<T: Unresolved> Future for Pending<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| T::unresolved()))
    }
}
