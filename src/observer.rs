// src/observer.rs

//! One-shot readiness observation.
//!
//! An observer subscribes to a `watch` channel, evaluates a predicate on the
//! current value and on every change, and invokes its callback the first
//! time the predicate holds. It retires after firing, after its own timeout,
//! or when cancelled; whichever happens first wins and the others become
//! no-ops.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// How a registration was retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveOutcome {
    /// The predicate held and the callback ran.
    Ready,
    /// The timeout elapsed first; the callback did not run.
    TimedOut,
    /// Cancelled through [`ObserverHandle::cancel`].
    Cancelled,
    /// The observed channel closed before the predicate held.
    Closed,
}

const PENDING: u8 = 0;
const READY: u8 = 1;
const TIMED_OUT: u8 = 2;
const CANCELLED: u8 = 3;
const CLOSED: u8 = 4;

impl ObserveOutcome {
    fn code(self) -> u8 {
        match self {
            ObserveOutcome::Ready => READY,
            ObserveOutcome::TimedOut => TIMED_OUT,
            ObserveOutcome::Cancelled => CANCELLED,
            ObserveOutcome::Closed => CLOSED,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            READY => Some(ObserveOutcome::Ready),
            TIMED_OUT => Some(ObserveOutcome::TimedOut),
            CANCELLED => Some(ObserveOutcome::Cancelled),
            CLOSED => Some(ObserveOutcome::Closed),
            _ => None,
        }
    }
}

struct Registration {
    status: AtomicU8,
    cancelled: Notify,
}

impl Registration {
    /// Claim the registration for `outcome`. Only the first claim succeeds.
    fn retire(&self, outcome: ObserveOutcome) -> Result<(), ObserveOutcome> {
        self.status
            .compare_exchange(PENDING, outcome.code(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| ObserveOutcome::from_code(actual).unwrap_or(outcome))
    }

    fn outcome(&self) -> Option<ObserveOutcome> {
        ObserveOutcome::from_code(self.status.load(Ordering::Acquire))
    }
}

/// Handle to a pending observation.
///
/// Dropping the handle does not cancel the observation.
pub struct ObserverHandle {
    registration: Arc<Registration>,
    task: JoinHandle<ObserveOutcome>,
}

impl ObserverHandle {
    /// Retire the registration without firing. Returns `false` if it had
    /// already fired, timed out or been cancelled.
    pub fn cancel(&self) -> bool {
        match self.registration.retire(ObserveOutcome::Cancelled) {
            Ok(()) => {
                self.registration.cancelled.notify_one();
                debug!("observer cancelled");
                true
            }
            Err(_) => false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.registration.outcome().is_some()
    }

    /// The outcome, once retired.
    pub fn outcome(&self) -> Option<ObserveOutcome> {
        self.registration.outcome()
    }

    /// Wait until the registration is retired.
    pub async fn wait(self) -> ObserveOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            // A panicking predicate or callback ends the observation.
            Err(_) => self.registration.outcome().unwrap_or(ObserveOutcome::Closed),
        }
    }
}

impl std::fmt::Debug for ObserverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHandle")
            .field("outcome", &self.outcome())
            .finish()
    }
}

/// Register a one-shot observation on the current Tokio runtime.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
pub fn observe_once<T, P, F>(
    rx: watch::Receiver<T>,
    predicate: P,
    on_ready: F,
    timeout: Duration,
) -> ObserverHandle
where
    T: Send + Sync + 'static,
    P: FnMut(&T) -> bool + Send + 'static,
    F: FnOnce() + Send + 'static,
{
    observe_once_on(&Handle::current(), rx, predicate, on_ready, timeout)
}

/// Register a one-shot observation whose task runs on `runtime`.
pub fn observe_once_on<T, P, F>(
    runtime: &Handle,
    mut rx: watch::Receiver<T>,
    mut predicate: P,
    on_ready: F,
    timeout: Duration,
) -> ObserverHandle
where
    T: Send + Sync + 'static,
    P: FnMut(&T) -> bool + Send + 'static,
    F: FnOnce() + Send + 'static,
{
    let registration = Arc::new(Registration {
        status: AtomicU8::new(PENDING),
        cancelled: Notify::new(),
    });

    let reg = Arc::clone(&registration);
    let task = runtime.spawn(async move {
        let observed = tokio::select! {
            res = rx.wait_for(|value| predicate(value)) => {
                if res.is_ok() { ObserveOutcome::Ready } else { ObserveOutcome::Closed }
            }
            _ = tokio::time::sleep(timeout) => ObserveOutcome::TimedOut,
            _ = reg.cancelled.notified() => ObserveOutcome::Cancelled,
        };

        match reg.retire(observed) {
            Ok(()) => {
                debug!(outcome = ?observed, "observer retired");
                if observed == ObserveOutcome::Ready {
                    on_ready();
                }
                observed
            }
            Err(earlier) => earlier,
        }
    });

    ObserverHandle { registration, task }
}
