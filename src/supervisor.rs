// src/supervisor.rs

//! The execution supervisor.
//!
//! A [`Supervisor`] owns a single process slot. At most one command runs at a
//! time; a second `execute` while the first is still active is rejected with
//! [`SupervisorError::AlreadyRunning`] rather than queued.
//!
//! Every slot change is published on a `watch` channel (`true` = busy), which
//! is what [`Supervisor::when_idle`] and other observers subscribe to.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::errors::{Result, SupervisorError};
use crate::exec::process::ProcessShared;
use crate::exec::runner::{Control, RunSpec, run_process};
use crate::exec::{Command, ExecutionHandler, ProcessHandle, ProcessId};
use crate::observer::{ObserverHandle, observe_once_on};
use crate::types::{MINIMUM_TIMEOUT, QuitSignal, Timeout};

/// Default quiet period for draining output after a process has ended.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Construction-time settings for a [`Supervisor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Initial timeout; `Unbounded` unless configured.
    pub timeout: Timeout,
    pub quit_signal: QuitSignal,
    pub drain_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            timeout: Timeout::Unbounded,
            quit_signal: QuitSignal::default(),
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }
}

/// Supervises at most one external process at a time.
///
/// Cloning yields another reference to the same supervisor. When the last
/// reference is dropped, a still-running process is killed.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

struct Inner {
    runtime: Handle,
    slot: Mutex<Option<ActiveProcess>>,
    timeout: Mutex<Timeout>,
    quit_signal: QuitSignal,
    drain_grace: Duration,
    next_id: AtomicU64,
    busy: watch::Sender<bool>,
}

struct ActiveProcess {
    handle: ProcessHandle,
    control: mpsc::UnboundedSender<Control>,
}

impl ActiveProcess {
    fn is_active(&self) -> bool {
        !self.handle.state().is_terminal()
    }
}

impl Supervisor {
    /// Create a supervisor that spawns its background work on the current
    /// Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime; use
    /// [`Supervisor::with_runtime`] in that case.
    pub fn new(config: SupervisorConfig) -> Self {
        Self::with_runtime(config, Handle::current())
    }

    pub fn with_runtime(config: SupervisorConfig, runtime: Handle) -> Self {
        let (busy, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                runtime,
                slot: Mutex::new(None),
                timeout: Mutex::new(config.timeout),
                quit_signal: config.quit_signal,
                drain_grace: config.drain_grace,
                next_id: AtomicU64::new(1),
                busy,
            }),
        }
    }

    /// Run `command` with the supervisor's current timeout.
    ///
    /// Returns as soon as the run has been handed to the background runner;
    /// spawn failures and everything after are reported through `handler`
    /// and [`ProcessHandle::wait`].
    pub fn execute<H>(&self, command: Command, handler: H) -> Result<ProcessHandle>
    where
        H: ExecutionHandler,
    {
        let timeout = *self.inner.lock_timeout();
        self.launch(command, timeout, handler)
    }

    /// Run `command` with an explicit timeout.
    ///
    /// A `timeout` below [`MINIMUM_TIMEOUT`] is not honoured: the configured
    /// timeout is used instead, or the minimum itself if none was ever set.
    pub fn execute_with_timeout<H>(
        &self,
        command: Command,
        timeout: Duration,
        handler: H,
    ) -> Result<ProcessHandle>
    where
        H: ExecutionHandler,
    {
        let effective = Timeout::at_least_minimum(timeout).unwrap_or_else(|| {
            match *self.inner.lock_timeout() {
                Timeout::Unbounded => Timeout::Limited(MINIMUM_TIMEOUT),
                configured => configured,
            }
        });
        self.launch(command, effective, handler)
    }

    fn launch<H>(&self, command: Command, timeout: Timeout, handler: H) -> Result<ProcessHandle>
    where
        H: ExecutionHandler,
    {
        command.validate()?;

        let mut slot = self.inner.lock_slot();
        if let Some(active) = slot.as_ref().filter(|a| a.is_active()) {
            debug!(
                process_id = active.handle.id(),
                "execute rejected; a command is already running"
            );
            return Err(SupervisorError::AlreadyRunning);
        }

        let id: ProcessId = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(ProcessShared::new(id, command, timeout));
        let handle = ProcessHandle::new(Arc::clone(&shared));
        let (control, control_rx) = mpsc::unbounded_channel();

        *slot = Some(ActiveProcess {
            handle: handle.clone(),
            control,
        });
        self.inner.publish(&slot);
        drop(slot);

        let spec = RunSpec {
            shared,
            quit_signal: self.inner.quit_signal.clone(),
            drain_grace: self.inner.drain_grace,
        };
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let release = move || {
            if let Some(inner) = weak.upgrade() {
                inner.release(id);
            }
        };

        self.inner
            .runtime
            .spawn(run_process(spec, handler, control_rx, release));

        Ok(handle)
    }

    /// True iff the slot holds a process that has not reached a terminal
    /// state. Never waits on the process.
    pub fn is_running(&self) -> bool {
        self.inner
            .lock_slot()
            .as_ref()
            .is_some_and(ActiveProcess::is_active)
    }

    /// The handle currently in the slot, if any.
    pub fn current(&self) -> Option<ProcessHandle> {
        self.inner
            .lock_slot()
            .as_ref()
            .map(|a| a.handle.clone())
    }

    /// Set the timeout for subsequent `execute` calls. Values below
    /// [`MINIMUM_TIMEOUT`] are ignored and the previous timeout is kept.
    pub fn set_timeout(&self, duration: Duration) {
        match Timeout::at_least_minimum(duration) {
            Some(timeout) => {
                *self.inner.lock_timeout() = timeout;
                debug!(%timeout, "timeout updated");
            }
            None => {
                debug!(
                    requested = ?duration,
                    minimum = ?MINIMUM_TIMEOUT,
                    "timeout below minimum; keeping previous value"
                );
            }
        }
    }

    pub fn timeout(&self) -> Timeout {
        *self.inner.lock_timeout()
    }

    /// Forcibly terminate the active process and clear the slot.
    ///
    /// Returns `false` when there was nothing to kill: an empty slot, or a
    /// process that already exited and is only relaying its last output.
    pub fn kill(&self) -> bool {
        let mut slot = self.inner.lock_slot();
        let Some(active) = slot.take_if(|a| a.handle.shared().claim_kill()) else {
            if let Some(active) = slot.as_ref() {
                debug!(
                    process_id = active.handle.id(),
                    "kill requested but process already exited"
                );
            }
            return false;
        };
        self.inner.publish(&slot);
        drop(slot);

        info!(
            process_id = active.handle.id(),
            pid = active.handle.pid(),
            "killing active process"
        );
        if active.control.send(Control::Kill).is_err() {
            warn!(
                process_id = active.handle.id(),
                "runner already gone while killing"
            );
        }
        true
    }

    /// Ask the active process to finish up and exit on its own.
    ///
    /// The slot stays occupied until the process's exit is observed.
    pub fn send_quit_signal(&self) -> Result<()> {
        let slot = self.inner.lock_slot();
        let active = slot
            .as_ref()
            .filter(|a| a.is_active() && !a.handle.shared().has_exited())
            .ok_or(SupervisorError::NoActiveProcess)?;

        active
            .control
            .send(Control::Quit)
            .map_err(|_| SupervisorError::NoActiveProcess)?;

        info!(process_id = active.handle.id(), "quit signal requested");
        Ok(())
    }

    /// Busy/idle notifications: the value is `true` while a command runs.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.busy.subscribe()
    }

    /// Invoke `on_ready` once the supervisor is idle, unless `timeout`
    /// elapses first. Fires immediately if already idle.
    pub fn when_idle<F>(&self, on_ready: F, timeout: Duration) -> ObserverHandle
    where
        F: FnOnce() + Send + 'static,
    {
        observe_once_on(
            &self.inner.runtime,
            self.subscribe(),
            |busy: &bool| !*busy,
            on_ready,
            timeout,
        )
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("current", &self.current())
            .field("timeout", &self.timeout())
            .field("quit_signal", &self.inner.quit_signal)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn lock_slot(&self) -> MutexGuard<'_, Option<ActiveProcess>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_timeout(&self) -> MutexGuard<'_, Timeout> {
        self.timeout.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear the slot if it still holds process `id`.
    fn release(&self, id: ProcessId) {
        let mut slot = self.lock_slot();
        if slot.as_ref().is_some_and(|a| a.handle.id() == id) {
            *slot = None;
        }
        self.publish(&slot);
    }

    /// Must be called with the slot lock held.
    fn publish(&self, slot: &Option<ActiveProcess>) {
        let busy = slot.as_ref().is_some_and(ActiveProcess::is_active);
        self.busy.send_if_modified(|current| {
            if *current != busy {
                *current = busy;
                true
            } else {
                false
            }
        });
    }
}
