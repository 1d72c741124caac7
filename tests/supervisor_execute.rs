// tests/supervisor_execute.rs
#![cfg(unix)]

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Barrier;

use probevisor::exec::callbacks;
use probevisor::types::ProcessState;
use probevisor::{Command, Supervisor, SupervisorConfig, SupervisorError};
use probevisor_test_utils::builders::ScriptBuilder;
use probevisor_test_utils::recorder::{Event, RecordingHandler};
use probevisor_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn probe_with_two_lines_reports_success_after_ordered_output() -> TestResult {
    init_tracing();

    let probe = ScriptBuilder::new("probe")
        .line("echo \"input: $3\"")
        .line("echo \"flags: $1 $2\"")
        .exit(0)
        .build()?;

    let supervisor = Supervisor::new(SupervisorConfig::default());
    let (handler, recording) = RecordingHandler::new();

    let handle = supervisor.execute_with_timeout(
        probe.command(["-v", "quiet", "file.mp4"]),
        Duration::from_secs(30),
        handler,
    )?;
    let result = with_timeout(handle.wait()).await;

    assert_eq!(result.state, ProcessState::CompletedSuccess);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.output, vec!["input: file.mp4", "flags: -v quiet"]);

    let events = recording.events();
    assert_eq!(events.len(), 4, "events: {events:?}");
    assert!(matches!(events[0], Event::Started(Some(_))));
    assert_eq!(events[1], Event::Line("input: file.mp4".to_string()));
    assert_eq!(events[2], Event::Line("flags: -v quiet".to_string()));
    assert_eq!(events[3], Event::Completed(result));

    assert!(!supervisor.is_running());
    Ok(())
}

#[tokio::test]
async fn missing_binary_completes_with_failure_and_no_output() -> TestResult {
    init_tracing();

    let supervisor = Supervisor::new(SupervisorConfig::default());
    let (handler, recording) = RecordingHandler::new();

    let handle = supervisor.execute(
        Command::new("/nonexistent/dir/probe").arg("-version"),
        handler,
    )?;
    let result = with_timeout(handle.wait()).await;

    assert_eq!(result.state, ProcessState::CompletedFailure);
    assert_eq!(result.exit_code, None);
    assert!(result.error.as_deref().is_some_and(|e| e.contains("failed to spawn")));
    assert_eq!(recording.events(), vec![Event::Completed(result)]);
    assert!(!supervisor.is_running());
    assert!(supervisor.current().is_none());
    Ok(())
}

#[tokio::test]
async fn empty_command_is_rejected_and_slot_is_unchanged() -> TestResult {
    init_tracing();

    let supervisor = Supervisor::new(SupervisorConfig::default());
    let err = supervisor
        .execute(Command::from_argv(Vec::<String>::new()), ())
        .unwrap_err();
    assert!(matches!(err, SupervisorError::InvalidArgument(_)));
    assert!(supervisor.current().is_none());

    // Also while something is running: the running process stays in place.
    let hung = ScriptBuilder::new("hung").hang().build()?;
    let running = supervisor.execute(hung.command(Vec::<String>::new()), ())?;
    let err = supervisor
        .execute(Command::from_argv(Vec::<String>::new()), ())
        .unwrap_err();
    assert!(matches!(err, SupervisorError::InvalidArgument(_)));
    assert_eq!(supervisor.current().map(|h| h.id()), Some(running.id()));

    assert!(supervisor.kill());
    Ok(())
}

#[tokio::test]
async fn second_execute_while_running_is_rejected_and_never_spawns() -> TestResult {
    init_tracing();

    let first = ScriptBuilder::new("first").hang().build()?;
    let second = ScriptBuilder::new("second")
        .line("touch \"$(dirname \"$0\")/spawned\"")
        .build()?;

    let supervisor = Supervisor::new(SupervisorConfig::default());
    let handle = supervisor.execute(first.command(Vec::<String>::new()), ())?;
    assert!(supervisor.is_running());

    let err = supervisor
        .execute(second.command(Vec::<String>::new()), ())
        .unwrap_err();
    assert!(matches!(err, SupervisorError::AlreadyRunning));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!second.dir().join("spawned").exists());
    assert!(handle.is_running());

    assert!(supervisor.kill());
    let result = with_timeout(handle.wait()).await;
    assert_eq!(result.state, ProcessState::Killed);
    Ok(())
}

#[tokio::test]
async fn execute_is_allowed_again_after_completion() -> TestResult {
    init_tracing();

    let quick = ScriptBuilder::new("quick").echo_lines(&["done"]).build()?;
    let supervisor = Supervisor::new(SupervisorConfig::default());

    let first = supervisor.execute(quick.command(Vec::<String>::new()), ())?;
    let first_result = with_timeout(first.wait()).await;
    assert!(first_result.is_success());

    let second = supervisor.execute(quick.command(Vec::<String>::new()), ())?;
    assert_ne!(first.id(), second.id());
    assert!(with_timeout(second.wait()).await.is_success());
    Ok(())
}

#[tokio::test]
async fn completion_callback_can_chain_the_next_command() -> TestResult {
    init_tracing();

    let quick = ScriptBuilder::new("quick").echo_lines(&["one"]).build()?;
    let supervisor = Supervisor::new(SupervisorConfig::default());

    let (tx, rx) = tokio::sync::oneshot::channel();
    let chained = supervisor.clone();
    let next_cmd = quick.command(Vec::<String>::new());

    supervisor.execute(
        quick.command(Vec::<String>::new()),
        callbacks(
            |_line| {},
            move |_result| {
                let _ = tx.send(chained.execute(next_cmd, ()).map(|h| h.id()));
            },
        ),
    )?;

    let next = with_timeout(rx).await?;
    assert!(next.is_ok(), "slot must be free when on_complete runs: {next:?}");
    Ok(())
}

#[tokio::test]
async fn nonzero_exit_is_a_failure_and_stderr_is_relayed() -> TestResult {
    init_tracing();

    let probe = ScriptBuilder::new("probe")
        .line("echo 'clip.mp4: Invalid data found' >&2")
        .exit(3)
        .build()?;

    let supervisor = Supervisor::new(SupervisorConfig::default());
    let (handler, recording) = RecordingHandler::new();
    let handle = supervisor.execute(probe.command(["clip.mp4"]), handler)?;
    let result = with_timeout(handle.wait()).await;

    assert_eq!(result.state, ProcessState::CompletedFailure);
    assert_eq!(result.exit_code, Some(3));
    assert_eq!(recording.lines(), vec!["clip.mp4: Invalid data found"]);
    assert_eq!(recording.completions().len(), 1);
    Ok(())
}

#[tokio::test]
async fn env_overlay_extends_inherited_environment() -> TestResult {
    init_tracing();

    let probe = ScriptBuilder::new("probe")
        .line("echo \"overlay=$PROBE_OVERLAY\"")
        .line("[ -n \"$PATH\" ] && echo inherited")
        .build()?;

    let supervisor = Supervisor::new(SupervisorConfig::default());
    let handle = supervisor.execute(
        probe
            .command(Vec::<String>::new())
            .env("PROBE_OVERLAY", "yes"),
        (),
    )?;
    let result = with_timeout(handle.wait()).await;

    assert!(result.is_success());
    assert_eq!(result.output, vec!["overlay=yes", "inherited"]);
    Ok(())
}

#[tokio::test]
async fn busy_flag_follows_the_slot() -> TestResult {
    init_tracing();

    let quick = ScriptBuilder::new("quick")
        .line("sleep 0.2")
        .echo_lines(&["ok"])
        .build()?;
    let supervisor = Supervisor::new(SupervisorConfig::default());
    let mut busy = supervisor.subscribe();
    assert!(!*busy.borrow());

    let handle = supervisor.execute(quick.command(Vec::<String>::new()), ())?;
    assert!(*busy.borrow_and_update());

    with_timeout(busy.wait_for(|b| !*b)).await?;
    assert!(!supervisor.is_running());
    assert!(with_timeout(handle.wait()).await.is_success());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_execute_admits_exactly_one_command() -> TestResult {
    init_tracing();

    const CALLERS: usize = 8;

    let probe = ScriptBuilder::new("probe")
        .line("touch \"$1\"")
        .hang()
        .build()?;
    let markers = tempfile::tempdir()?;

    let supervisor = Supervisor::new(SupervisorConfig::default());
    let barrier = Arc::new(Barrier::new(CALLERS));

    let tasks: Vec<_> = (0..CALLERS)
        .map(|i| {
            let supervisor = supervisor.clone();
            let barrier = Arc::clone(&barrier);
            let cmd = probe.command([markers.path().join(format!("caller-{i}")).to_string_lossy()]);
            tokio::spawn(async move {
                barrier.wait().await;
                supervisor.execute(cmd, ())
            })
        })
        .collect();

    let mut admitted = Vec::new();
    let mut rejected = 0;
    for task in tasks {
        match task.await? {
            Ok(handle) => admitted.push(handle),
            Err(SupervisorError::AlreadyRunning) => rejected += 1,
            Err(other) => return Err(other.into()),
        }
    }
    assert_eq!(admitted.len(), 1);
    assert_eq!(rejected, CALLERS - 1);
    assert!(supervisor.is_running());

    // Give the admitted script time to start; rejected calls must never spawn.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let spawned = std::fs::read_dir(markers.path())?.count();
    assert_eq!(spawned, 1);

    assert!(supervisor.kill());
    let result = with_timeout(admitted[0].wait()).await;
    assert_eq!(result.state, ProcessState::Killed);
    Ok(())
}
