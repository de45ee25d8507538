// tests/process_runner.rs
//
// Runs real child processes through `sh`, so these only build on Unix.
#![cfg(unix)]

use std::error::Error;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tracing::Level;

use restoreq::config::MonitorSettings;
use restoreq::engine::{RestoreEvent, RestoreOrchestrator};
use restoreq::errors::RestoreError;
use restoreq::exec::{CancelSignal, CancelSource, ProcessExit, ProcessRunner, RestoreInvocation};
use restoreq::types::{IdlePolicy, ProjectRequest};
use restoreq_test_utils::builders::ConfigBuilder;
use restoreq_test_utils::logs::LogCapture;
use restoreq_test_utils::recording::{RecordingReporter, RecordingTransport};
use restoreq_test_utils::{init_tracing, wait_until, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn fast_settings(idle_ms: u64, policy: IdlePolicy) -> MonitorSettings {
    MonitorSettings {
        idle_timeout: Duration::from_millis(idle_ms),
        poll_interval: Duration::from_millis(20),
        on_idle_timeout: policy,
    }
}

fn shell(script: &str, dir: &Path) -> RestoreInvocation {
    RestoreInvocation {
        program: PathBuf::from("sh"),
        args: vec!["-c".to_string(), script.to_string()],
        working_dir: dir.to_path_buf(),
        project: dir.join("project.json"),
    }
}

/// Write an executable restore tool that succeeds only when called as
/// `<tool> restore` next to a `project.json`.
fn write_fake_tool(dir: &Path) -> std::io::Result<PathBuf> {
    let tool = dir.join("fake-restore");
    fs::write(
        &tool,
        "#!/bin/sh\n\
         [ \"$1\" = restore ] || exit 64\n\
         [ -f project.json ] || exit 65\n\
         echo restoring\n\
         exit 0\n",
    )?;
    let mut perms = fs::metadata(&tool)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&tool, perms)?;
    Ok(tool)
}

#[tokio::test]
async fn successful_process_reports_exit_zero() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;

    let runner = ProcessRunner::new(fast_settings(2_000, IdlePolicy::Kill));
    let exit = with_timeout(runner.run(
        &shell("echo out; echo err >&2; sleep 0.1", dir.path()),
        CancelSignal::never(),
    ))
    .await?;

    assert!(matches!(exit, ProcessExit::Exited(0) | ProcessExit::FastFail(0)));
    assert!(exit.succeeded());
    Ok(())
}

#[tokio::test]
async fn non_zero_exit_is_reported_as_is() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;

    let runner = ProcessRunner::new(fast_settings(2_000, IdlePolicy::Kill));
    let exit = with_timeout(runner.run(&shell("sleep 0.1; exit 3", dir.path()), CancelSignal::never()))
        .await?;

    assert_eq!(exit.code(), 3);
    assert!(!exit.succeeded());
    Ok(())
}

#[tokio::test]
async fn missing_binary_is_a_spawn_error() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;

    let runner = ProcessRunner::new(fast_settings(2_000, IdlePolicy::Kill));
    let invocation = RestoreInvocation {
        program: dir.path().join("does-not-exist"),
        args: vec!["restore".to_string()],
        working_dir: dir.path().to_path_buf(),
        project: dir.path().join("project.json"),
    };

    match runner.run(&invocation, CancelSignal::never()).await {
        Err(RestoreError::Spawn { program, .. }) => {
            assert!(program.contains("does-not-exist"));
        }
        other => panic!("expected spawn error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn silent_process_is_timed_out_and_killed() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;

    let runner = ProcessRunner::new(fast_settings(200, IdlePolicy::Kill));
    let started = Instant::now();
    let exit = with_timeout(runner.run(
        &shell("sleep 1; touch survived", dir.path()),
        CancelSignal::never(),
    ))
    .await?;

    assert_eq!(exit, ProcessExit::IdleTimeout);
    assert_eq!(exit.code(), -1);
    assert!(started.elapsed() < Duration::from_millis(900));

    tokio::time::sleep(Duration::from_millis(1_300)).await;
    assert!(
        !dir.path().join("survived").exists(),
        "killed process must not keep running"
    );
    Ok(())
}

#[tokio::test]
async fn abandon_policy_leaves_the_process_running() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;

    let runner = ProcessRunner::new(fast_settings(200, IdlePolicy::Abandon));
    let exit = with_timeout(runner.run(
        &shell("sleep 0.6; touch survived", dir.path()),
        CancelSignal::never(),
    ))
    .await?;
    assert_eq!(exit, ProcessExit::IdleTimeout);

    let marker = dir.path().join("survived");
    with_timeout(async {
        while !marker.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    Ok(())
}

#[tokio::test]
async fn steady_output_keeps_a_long_process_alive() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;

    // Runs ~1s in total but never goes quiet for more than ~0.1s.
    let runner = ProcessRunner::new(fast_settings(500, IdlePolicy::Kill));
    let exit = with_timeout(runner.run(
        &shell(
            "for i in 1 2 3 4 5 6 7 8 9 10; do echo tick $i; sleep 0.1; done",
            dir.path(),
        ),
        CancelSignal::never(),
    ))
    .await?;

    assert_eq!(exit, ProcessExit::Exited(0));
    Ok(())
}

#[tokio::test]
async fn non_utf8_output_does_not_stop_the_reader() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;

    // A lone 0xE9 byte, then steady output well past the idle timeout.
    let runner = ProcessRunner::new(fast_settings(400, IdlePolicy::Kill));
    let exit = with_timeout(runner.run(
        &shell(
            "printf 'caf\\351\\n'; for i in 1 2 3 4 5 6 7 8 9 10; do echo tick $i; sleep 0.1; done; exit 0",
            dir.path(),
        ),
        CancelSignal::never(),
    ))
    .await?;

    assert_eq!(exit, ProcessExit::Exited(0));
    Ok(())
}

#[tokio::test]
async fn idle_timeout_warns_and_stderr_logs_at_error() -> TestResult {
    let logs = LogCapture::new();
    let _guard = logs.install();
    let dir = TempDir::new()?;

    let runner = ProcessRunner::new(fast_settings(300, IdlePolicy::Kill));
    let invocation = shell("echo 'feed unreachable' >&2; echo resolving; sleep 2", dir.path());
    let exit = with_timeout(runner.run(&invocation, CancelSignal::never())).await?;
    assert_eq!(exit, ProcessExit::IdleTimeout);

    let project = invocation.project.display().to_string();
    let warnings: Vec<_> = logs
        .events()
        .into_iter()
        .filter(|e| e.level == Level::WARN && e.target == "restoreq::exec::runner")
        .collect();
    assert_eq!(warnings.len(), 1, "expected one warning, got {warnings:?}");
    assert!(warnings[0].message.contains("no output"));
    assert_eq!(warnings[0].field("project"), Some(project.as_str()));

    wait_until(|| {
        !logs.matching(Level::ERROR, "feed unreachable").is_empty()
            && !logs.matching(Level::INFO, "resolving").is_empty()
    })
    .await;
    Ok(())
}

#[tokio::test]
async fn cancellation_kills_the_process() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;

    let runner = ProcessRunner::new(fast_settings(5_000, IdlePolicy::Abandon));
    let source = CancelSource::new();
    let signal = source.signal();

    let invocation = shell("sleep 1; touch survived", dir.path());
    let run = tokio::spawn(async move { runner.run(&invocation, signal).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    source.cancel();

    let exit = with_timeout(run).await??;
    assert_eq!(exit, ProcessExit::Cancelled);

    tokio::time::sleep(Duration::from_millis(1_300)).await;
    assert!(!dir.path().join("survived").exists());
    Ok(())
}

#[tokio::test]
async fn already_cancelled_signal_skips_spawning() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;

    let runner = ProcessRunner::new(fast_settings(2_000, IdlePolicy::Kill));
    let source = CancelSource::new();
    source.cancel();

    let exit = runner
        .run(&shell("touch spawned", dir.path()), source.signal())
        .await?;
    assert_eq!(exit, ProcessExit::Cancelled);
    assert!(!dir.path().join("spawned").exists());
    Ok(())
}

#[tokio::test]
async fn orchestrator_runs_the_configured_tool_in_the_project_directory() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let tool = write_fake_tool(dir.path())?;

    let project_dir = dir.path().join("web");
    fs::create_dir(&project_dir)?;
    let project = project_dir.join("project.json");
    fs::write(&project, "{}")?;

    let cfg = ConfigBuilder::new()
        .primary(tool.to_str().ok_or("non-utf8 temp path")?)
        .idle_timeout("5s")
        .build();
    let reporter = RecordingReporter::new();
    let transport = RecordingTransport::new();
    let orchestrator = RestoreOrchestrator::with_process_backend(
        &cfg,
        Arc::new(reporter.clone()),
        Arc::new(transport.clone()),
    );

    let ok = with_timeout(orchestrator.submit(ProjectRequest::new(&project, 9)).wait()).await;
    assert!(ok.succeeded, "restore in project dir failed: {ok:?}");

    // No project.json next to this one, so the tool fails.
    let missing = dir.path().join("other").join("project.json");
    fs::create_dir(dir.path().join("other"))?;
    let failed = with_timeout(orchestrator.submit(ProjectRequest::new(&missing, 10)).wait()).await;
    assert_eq!(failed.exit_code, 65);

    let file_name = project.display().to_string();
    assert_eq!(
        reporter.events_for(&file_name),
        vec![
            RestoreEvent::started(file_name.clone()),
            RestoreEvent::finished(file_name.clone(), true),
        ]
    );
    let messages = transport.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].context_id, 9);
    Ok(())
}
