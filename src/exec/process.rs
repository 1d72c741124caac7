// src/exec/process.rs

//! Process handles and the results they resolve to.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use tokio::sync::watch;

use crate::types::{ProcessState, Timeout};

use super::command::Command;

/// Supervisor-assigned identifier, unique per supervisor instance.
pub type ProcessId = u64;

/// Final report for one managed process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    pub process_id: ProcessId,
    /// Always a terminal state.
    pub state: ProcessState,
    /// `None` when the process never started or was ended by a signal.
    pub exit_code: Option<i32>,
    /// Every relayed line, in delivery order.
    pub output: Vec<String>,
    /// Spawn or wait failure description, if any.
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl ProcessResult {
    pub fn is_success(&self) -> bool {
        self.state == ProcessState::CompletedSuccess
    }
}

/// State shared between the supervisor, the runner task and every
/// [`ProcessHandle`] clone.
pub(crate) struct ProcessShared {
    id: ProcessId,
    command: Command,
    timeout: Timeout,
    pid: OnceLock<u32>,
    /// Set once the OS process has been reaped, even while output is
    /// still draining. Kills are refused from then on.
    exited: Mutex<bool>,
    state: watch::Sender<ProcessState>,
    result: watch::Sender<Option<ProcessResult>>,
}

impl ProcessShared {
    pub(crate) fn new(id: ProcessId, command: Command, timeout: Timeout) -> Self {
        let (state, _) = watch::channel(ProcessState::Created);
        let (result, _) = watch::channel(None);
        Self {
            id,
            command,
            timeout,
            pid: OnceLock::new(),
            exited: Mutex::new(false),
            state,
            result,
        }
    }

    pub(crate) fn id(&self) -> ProcessId {
        self.id
    }

    pub(crate) fn command(&self) -> &Command {
        &self.command
    }

    pub(crate) fn timeout(&self) -> Timeout {
        self.timeout
    }

    pub(crate) fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    pub(crate) fn set_pid(&self, pid: u32) {
        let _ = self.pid.set(pid);
    }

    /// Move to `next` if the state machine allows it. Returns whether the
    /// transition happened; terminal states never change again.
    pub(crate) fn transition(&self, next: ProcessState) -> bool {
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    /// Record that the process exited on its own.
    pub(crate) fn mark_exited(&self) {
        *self.lock_exited() = true;
    }

    pub(crate) fn has_exited(&self) -> bool {
        *self.lock_exited()
    }

    /// Move to `Killed` unless the process already exited or is terminal.
    pub(crate) fn claim_kill(&self) -> bool {
        let exited = self.lock_exited();
        !*exited && self.transition(ProcessState::Killed)
    }

    fn lock_exited(&self) -> MutexGuard<'_, bool> {
        self.exited.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn publish_result(&self, result: ProcessResult) {
        self.result.send_replace(Some(result));
    }
}

/// A live view of one managed process.
///
/// Cheap to clone; every clone observes the same state. The process itself
/// is owned by the supervisor's runner task, so dropping a handle never
/// affects the process.
#[derive(Clone)]
pub struct ProcessHandle {
    shared: Arc<ProcessShared>,
}

impl ProcessHandle {
    pub(crate) fn new(shared: Arc<ProcessShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn shared(&self) -> &Arc<ProcessShared> {
        &self.shared
    }

    pub fn id(&self) -> ProcessId {
        self.shared.id
    }

    /// OS process id, once the process has been spawned.
    pub fn pid(&self) -> Option<u32> {
        self.shared.pid.get().copied()
    }

    pub fn command(&self) -> &Command {
        &self.shared.command
    }

    /// The timeout this process was armed with.
    pub fn timeout(&self) -> Timeout {
        self.shared.timeout
    }

    pub fn state(&self) -> ProcessState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        !self.state().is_terminal()
    }

    /// Watch every state transition of this process.
    pub fn subscribe_state(&self) -> watch::Receiver<ProcessState> {
        self.shared.state.subscribe()
    }

    /// The final result, if the runner has already delivered it.
    pub fn try_result(&self) -> Option<ProcessResult> {
        self.shared.result.borrow().clone()
    }

    /// Wait until the process reaches a terminal state and its output has
    /// been relayed. Resolves for every terminal path, kills and timeouts
    /// included.
    pub async fn wait(&self) -> ProcessResult {
        let mut rx = self.shared.result.subscribe();
        let delivered = match rx.wait_for(Option::is_some).await {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };

        // The sender lives in `self.shared`, so the channel cannot close
        // while we hold it; the fallback keeps this path panic-free.
        delivered.unwrap_or_else(|| ProcessResult {
            process_id: self.id(),
            state: self.state(),
            exit_code: None,
            output: Vec::new(),
            error: Some("process result channel closed".to_string()),
            elapsed: Duration::ZERO,
        })
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("id", &self.id())
            .field("pid", &self.pid())
            .field("state", &self.state())
            .field("command", &self.shared.command)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> ProcessShared {
        ProcessShared::new(7, Command::new("probe"), Timeout::Unbounded)
    }

    #[test]
    fn transitions_follow_the_state_machine() {
        let s = shared();
        assert_eq!(s.state(), ProcessState::Created);
        assert!(s.transition(ProcessState::Running));
        assert!(!s.transition(ProcessState::Running));
        assert!(s.transition(ProcessState::TimedOut));
        assert!(!s.transition(ProcessState::Killed));
        assert!(!s.transition(ProcessState::CompletedSuccess));
        assert_eq!(s.state(), ProcessState::TimedOut);
    }

    #[test]
    fn pid_is_set_once() {
        let s = Arc::new(shared());
        s.set_pid(10);
        s.set_pid(11);
        assert_eq!(ProcessHandle::new(s).pid(), Some(10));
    }

    #[test]
    fn kill_is_refused_once_exited() {
        let s = shared();
        assert!(s.transition(ProcessState::Running));
        s.mark_exited();
        assert!(s.has_exited());
        assert!(!s.claim_kill());
        assert_eq!(s.state(), ProcessState::Running);
        assert!(s.transition(ProcessState::CompletedSuccess));
    }

    #[test]
    fn kill_claims_a_live_process_once() {
        let s = shared();
        assert!(s.transition(ProcessState::Running));
        assert!(s.claim_kill());
        assert!(!s.claim_kill());
        assert_eq!(s.state(), ProcessState::Killed);
    }

    #[tokio::test]
    async fn wait_resolves_once_result_is_published() {
        let s = Arc::new(shared());
        let handle = ProcessHandle::new(Arc::clone(&s));
        assert!(handle.try_result().is_none());

        let waiter = tokio::spawn({
            let handle = handle.clone();
            async move { handle.wait().await }
        });

        s.transition(ProcessState::Killed);
        s.publish_result(ProcessResult {
            process_id: 7,
            state: ProcessState::Killed,
            exit_code: None,
            output: vec![],
            error: None,
            elapsed: Duration::from_millis(5),
        });

        let result = waiter.await.unwrap();
        assert_eq!(result.state, ProcessState::Killed);
        assert!(!handle.is_running());
        assert_eq!(handle.try_result(), Some(result));
    }
}
