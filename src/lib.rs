// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod observer;
pub mod provision;
pub mod supervisor;
pub mod types;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_optional};
use crate::exec::{ProcessResult, callbacks};
use crate::provision::{BinaryProvisioner, LocalBinary};
use crate::types::{ProcessState, Timeout, parse_duration};

pub use crate::errors::{Result as SupervisorResult, SupervisorError};
pub use crate::exec::{Command, ExecutionHandler, ProcessHandle};
pub use crate::observer::{ObserveOutcome, ObserverHandle, observe_once};
pub use crate::supervisor::{Supervisor, SupervisorConfig};

/// Binary used when neither `--binary` nor `[binary].path` is given.
pub const DEFAULT_BINARY: &str = "ffprobe";

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - binary resolution
/// - the supervisor and its output relay
/// - Ctrl-C handling (first: quit signal, second: kill)
///
/// Returns the exit code the binary should exit with.
pub async fn run(args: CliArgs) -> Result<i32> {
    let cfg = load_optional(args.config.as_deref().map(Path::new))
        .context("loading configuration")?;

    let binary_spec = args
        .binary
        .clone()
        .or_else(|| cfg.binary.clone())
        .unwrap_or_else(|| DEFAULT_BINARY.to_string());

    let mut env = cfg.env.clone();
    env.extend(args.env.iter().cloned());

    let binary = LocalBinary::resolve(&binary_spec)
        .with_context(|| format!("resolving binary '{binary_spec}'"))?
        .with_env(env);

    let requested_timeout = args
        .timeout
        .as_deref()
        .map(parse_duration)
        .transpose()
        .map_err(anyhow::Error::msg)
        .context("parsing --timeout")?;

    if args.dry_run {
        print_dry_run(&cfg, &binary, &args.args, requested_timeout);
        return Ok(0);
    }

    binary
        .ensure_executable()
        .with_context(|| format!("preparing {}", binary.binary_path().display()))?;
    let command = binary.command(&args.args)?;

    let supervisor = Supervisor::new(cfg.supervisor.clone());
    if let Some(t) = requested_timeout {
        supervisor.set_timeout(t);
        if Timeout::at_least_minimum(t).is_none() {
            warn!(requested = ?t, "--timeout below minimum; ignored");
        }
    }

    let handle = supervisor.execute(
        command,
        callbacks(
            |line| println!("{line}"),
            |result: &ProcessResult| debug!(state = %result.state, "command completed"),
        ),
    )?;

    let waiter = handle.wait();
    tokio::pin!(waiter);
    let mut interrupts = 0u32;

    let result = loop {
        tokio::select! {
            result = &mut waiter => break result,
            signal = tokio::signal::ctrl_c() => {
                signal.context("listening for Ctrl+C")?;
                interrupts += 1;
                if interrupts == 1 {
                    info!("Ctrl+C received; asking process to quit (press again to kill)");
                    if let Err(e) = supervisor.send_quit_signal() {
                        debug!(error = %e, "quit signal not delivered");
                    }
                } else {
                    info!("second Ctrl+C; killing process");
                    supervisor.kill();
                }
            }
        }
    };

    if let Some(err) = &result.error {
        eprintln!("probevisor: {err}");
    }
    Ok(exit_code_for(&result))
}

/// Map a terminal result onto a shell exit code.
pub fn exit_code_for(result: &ProcessResult) -> i32 {
    match result.state {
        ProcessState::CompletedSuccess => 0,
        ProcessState::CompletedFailure => result.exit_code.filter(|c| *c != 0).unwrap_or(1),
        ProcessState::TimedOut => 124,
        ProcessState::Killed => 130,
        ProcessState::Created | ProcessState::Running => 1,
    }
}

fn print_dry_run(
    cfg: &ConfigFile,
    binary: &LocalBinary,
    args: &[String],
    requested_timeout: Option<std::time::Duration>,
) {
    let timeout = requested_timeout
        .and_then(Timeout::at_least_minimum)
        .unwrap_or(cfg.supervisor.timeout);

    println!("probevisor dry-run");
    println!("  binary = {}", binary.binary_path().display());
    println!("  ready = {}", binary.is_ready());
    println!("  args = {:?}", args);
    println!("  timeout = {timeout}");
    println!("  quit_signal = {:?}", cfg.supervisor.quit_signal);
    if !binary.env_overlay().is_empty() {
        println!("  env:");
        for (key, value) in binary.env_overlay() {
            println!("    {key}={value}");
        }
    }

    debug!("dry-run complete (no execution)");
}
