// src/exec/runner.rs

//! Background runner for one managed process.
//!
//! The runner owns the `tokio::process::Child`. It relays output lines to
//! the caller's [`ExecutionHandler`], reacts to control requests from the
//! supervisor (forced kill, cooperative quit), enforces the timeout, and
//! finally reports a [`ProcessResult`] exactly once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::types::{ProcessState, QuitSignal};

use super::handler::ExecutionHandler;
use super::process::{ProcessResult, ProcessShared};

/// Requests the supervisor sends to a running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    Kill,
    Quit,
}

/// Everything the runner needs besides the handler and channels.
pub(crate) struct RunSpec {
    pub shared: Arc<ProcessShared>,
    pub quit_signal: QuitSignal,
    /// Max quiet period while draining output after the process ended.
    pub drain_grace: Duration,
}

/// Run a process to completion.
///
/// `release` is called once the process is terminal and its output has been
/// relayed, before `on_complete` runs. The supervisor uses it to clear its
/// slot. The result is published to waiting handles after `on_complete`.
pub(crate) async fn run_process<H, R>(
    spec: RunSpec,
    mut handler: H,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
    release: R,
) where
    H: ExecutionHandler,
    R: FnOnce(),
{
    let started = Instant::now();
    let shared = Arc::clone(&spec.shared);
    let process_id = shared.id();
    let program = shared.command().program().unwrap_or_default().to_string();

    info!(
        process_id,
        cmd = %shared.command(),
        timeout = %shared.timeout(),
        "starting process"
    );

    let mut child = match shared
        .command()
        .to_tokio(spec.quit_signal.needs_stdin())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            error!(process_id, program = %program, error = %err, "failed to spawn process");
            shared.transition(ProcessState::CompletedFailure);
            let result = ProcessResult {
                process_id,
                state: shared.state(),
                exit_code: None,
                output: Vec::new(),
                error: Some(format!("failed to spawn '{program}': {err}")),
                elapsed: started.elapsed(),
            };
            finish(&shared, &mut handler, result, release);
            return;
        }
    };

    let pid = child.id();
    if let Some(pid) = pid {
        shared.set_pid(pid);
    }
    let mut stdin = child.stdin.take();

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    let readers = [
        spawn_line_reader(child.stdout.take(), line_tx.clone(), process_id, "stdout"),
        spawn_line_reader(child.stderr.take(), line_tx, process_id, "stderr"),
    ];

    // A kill may have landed between `execute` and the spawn.
    if shared.transition(ProcessState::Running) {
        debug!(process_id, pid, "process running");
        handler.on_start(pid);
    }

    let mut output = Vec::new();
    let mut lines_open = true;
    let mut forced = shared.state().is_terminal();
    let mut wait_error = None;
    let mut exit_status = None;

    let limit = shared.timeout().as_duration();
    let deadline = async move {
        match limit {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    while !forced && exit_status.is_none() && wait_error.is_none() {
        tokio::select! {
            maybe_line = line_rx.recv(), if lines_open => match maybe_line {
                Some(line) => relay(&mut handler, &mut output, process_id, line),
                None => lines_open = false,
            },

            status = child.wait() => {
                shared.mark_exited();
                match status {
                    Ok(status) => exit_status = Some(status),
                    Err(err) => {
                        warn!(process_id, error = %err, "failed waiting for process");
                        wait_error = Some(format!("waiting for '{program}': {err}"));
                    }
                }
            }

            ctl = control_rx.recv() => match ctl {
                Some(Control::Quit) => {
                    deliver_quit(&spec.quit_signal, &mut stdin, &mut child, process_id).await;
                }
                Some(Control::Kill) => {
                    forced = true;
                }
                None => {
                    // Supervisor dropped; nobody can observe or stop us anymore.
                    debug!(process_id, "supervisor gone; killing process");
                    shared.transition(ProcessState::Killed);
                    forced = true;
                }
            },

            _ = &mut deadline => {
                if shared.transition(ProcessState::TimedOut) {
                    info!(process_id, timeout = %shared.timeout(), "process timed out; killing");
                }
                forced = true;
            }
        }
    }

    if forced || wait_error.is_some() {
        terminate(&mut child, pid, process_id);
        match child.wait().await {
            Ok(status) => exit_status = exit_status.or(Some(status)),
            Err(err) => debug!(process_id, error = %err, "failed reaping killed process"),
        }
    }
    drop(stdin);

    // Relay what is still buffered, bounded by the grace period per line.
    while lines_open {
        match tokio::time::timeout(spec.drain_grace, line_rx.recv()).await {
            Ok(Some(line)) => relay(&mut handler, &mut output, process_id, line),
            Ok(None) => lines_open = false,
            Err(_) => {
                debug!(process_id, "output still open after drain grace; detaching readers");
                // Descendants left in the group are holding the pipes open.
                if !forced {
                    if let Some(pid) = pid {
                        kill_group(pid, process_id);
                    }
                }
                break;
            }
        }
    }
    for reader in readers.into_iter().flatten() {
        reader.abort();
    }

    let exit_code = exit_status.and_then(|s| s.code());
    if !forced {
        let natural = match exit_status {
            Some(status) if status.success() && wait_error.is_none() => {
                ProcessState::CompletedSuccess
            }
            _ => ProcessState::CompletedFailure,
        };
        shared.transition(natural);
    }

    let result = ProcessResult {
        process_id,
        state: shared.state(),
        exit_code,
        output,
        error: wait_error,
        elapsed: started.elapsed(),
    };

    info!(
        process_id,
        exit_code,
        state = %result.state,
        elapsed_ms = result.elapsed.as_millis() as u64,
        "process finished"
    );

    finish(&shared, &mut handler, result, release);
}

fn finish<H, R>(shared: &ProcessShared, handler: &mut H, result: ProcessResult, release: R)
where
    H: ExecutionHandler,
    R: FnOnce(),
{
    release();
    handler.on_complete(&result);
    shared.publish_result(result);
}

fn relay<H: ExecutionHandler>(
    handler: &mut H,
    output: &mut Vec<String>,
    process_id: u64,
    line: String,
) {
    trace!(process_id, "output: {}", line);
    handler.on_line(&line);
    output.push(line);
}

/// Forward lines of one output stream into the shared line channel.
///
/// Lines are decoded lossily so that binary noise from the child can't stop
/// the relay.
fn spawn_line_reader<S>(
    stream: Option<S>,
    tx: mpsc::UnboundedSender<String>,
    process_id: u64,
    stream_name: &'static str,
) -> Option<JoinHandle<()>>
where
    S: AsyncRead + Unpin + Send + 'static,
{
    let stream = stream?;
    Some(tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    while matches!(buf.last(), Some(b'\n' | b'\r')) {
                        buf.pop();
                    }
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    debug!(process_id, stream = stream_name, error = %err, "output read failed");
                    break;
                }
            }
        }

        trace!(process_id, stream = stream_name, "output stream closed");
    }))
}

async fn deliver_quit(
    quit: &QuitSignal,
    stdin: &mut Option<ChildStdin>,
    child: &mut Child,
    process_id: u64,
) {
    match quit {
        QuitSignal::Stdin(input) => {
            let Some(pipe) = stdin.as_mut() else {
                warn!(process_id, "quit requested but stdin is not available");
                return;
            };
            let payload = format!("{input}\n");
            let written = match pipe.write_all(payload.as_bytes()).await {
                Ok(()) => pipe.flush().await,
                Err(err) => Err(err),
            };
            match written {
                Ok(()) => info!(process_id, "quit input written to stdin"),
                Err(err) => warn!(process_id, error = %err, "failed writing quit input"),
            }
        }
        QuitSignal::Interrupt => interrupt(child, process_id),
    }
}

#[cfg(unix)]
fn interrupt(child: &mut Child, process_id: u64) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        debug!(process_id, "quit requested but process already exited");
        return;
    };
    match killpg(Pid::from_raw(pid as i32), Signal::SIGINT) {
        Ok(()) => info!(process_id, pid, "sent SIGINT to process group"),
        Err(err) => warn!(process_id, pid, error = %err, "failed to send SIGINT"),
    }
}

#[cfg(not(unix))]
fn interrupt(child: &mut Child, process_id: u64) {
    warn!(process_id, "interrupt not supported on this platform; killing instead");
    if let Err(err) = child.start_kill() {
        debug!(process_id, error = %err, "kill failed; process may have exited");
    }
}

/// Forcibly stop the child and, on unix, everything in its process group.
fn terminate(child: &mut Child, pid: Option<u32>, process_id: u64) {
    if let Some(pid) = pid {
        kill_group(pid, process_id);
    }
    if let Err(err) = child.start_kill() {
        debug!(process_id, error = %err, "kill failed; process may have exited");
    }
}

#[cfg(unix)]
fn kill_group(pid: u32, process_id: u64) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    if let Err(err) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        debug!(process_id, pid, error = %err, "SIGKILL to process group failed");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32, _process_id: u64) {}
