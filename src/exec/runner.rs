// src/exec/runner.rs

//! Single restore process runner.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::MonitorSettings;
use crate::errors::{RestoreError, Result};
use crate::exec::activity::ActivityClock;
use crate::exec::cancel::CancelSignal;
use crate::types::{IdlePolicy, ProjectRequest};

/// Argument passed to the restore tool.
pub const RESTORE_ARG: &str = "restore";

/// Exit code reported when no real exit code exists (idle timeout,
/// cancellation, signal termination, internal failure).
pub const FAILURE_EXIT_CODE: i32 = -1;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Terminal result of one [`ProcessRunner::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// The process exited while being monitored.
    Exited(i32),
    /// The process had already exited right after spawn.
    FastFail(i32),
    /// No output within the idle timeout.
    IdleTimeout,
    /// The run was cancelled.
    Cancelled,
}

impl ProcessExit {
    pub fn code(&self) -> i32 {
        match self {
            ProcessExit::Exited(code) | ProcessExit::FastFail(code) => *code,
            ProcessExit::IdleTimeout | ProcessExit::Cancelled => FAILURE_EXIT_CODE,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.code() == 0
    }
}

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Fully resolved command line for one restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub project: PathBuf,
}

impl RestoreInvocation {
    /// `<program> restore`, run from the project's directory.
    pub fn for_project(program: &Path, project: &ProjectRequest) -> Self {
        Self {
            program: program.to_path_buf(),
            args: vec![RESTORE_ARG.to_string()],
            working_dir: project.working_dir(),
            project: project.path.clone(),
        }
    }

    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Runs restore processes under the idle watchdog.
#[derive(Debug, Clone, Copy)]
pub struct ProcessRunner {
    settings: MonitorSettings,
}

impl ProcessRunner {
    pub fn new(settings: MonitorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Spawn the invocation and wait for a terminal result.
    ///
    /// Output lines may still be logged after this returns when the process
    /// was abandoned.
    pub async fn run(
        &self,
        invocation: &RestoreInvocation,
        mut cancel: CancelSignal,
    ) -> Result<ProcessExit> {
        let project = invocation.project.display().to_string();

        if cancel.is_cancelled() {
            info!(project = %project, "restore cancelled before spawn");
            return Ok(ProcessExit::Cancelled);
        }

        info!(
            project = %project,
            cmd = %invocation.command_line(),
            cwd = %invocation.working_dir.display(),
            "restore packages"
        );

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(self.settings.on_idle_timeout == IdlePolicy::Kill);

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let mut child = cmd.spawn().map_err(|source| RestoreError::Spawn {
            program: invocation.program.display().to_string(),
            source,
        })?;

        if let Some(status) = child.try_wait()? {
            let code = exit_code(status);
            error!(
                project = %project,
                cmd = %invocation.command_line(),
                exit_code = code,
                "restore command failed immediately"
            );
            return Ok(ProcessExit::FastFail(code));
        }

        let clock = Arc::new(ActivityClock::new());

        if let Some(stdout) = child.stdout.take() {
            let clock = Arc::clone(&clock);
            let project = project.clone();
            tokio::spawn(forward_lines(stdout, OutputStream::Stdout, clock, project));
        }
        if let Some(stderr) = child.stderr.take() {
            let clock = Arc::clone(&clock);
            let project = project.clone();
            tokio::spawn(forward_lines(stderr, OutputStream::Stderr, clock, project));
        }

        let waited = async { child.wait().await.map(exit_code) };
        let verdict = monitor_exit(waited, &clock, &self.settings, &mut cancel).await?;

        match verdict {
            ProcessExit::Exited(code) => {
                info!(project = %project, exit_code = code, "restore process exited");
            }
            ProcessExit::IdleTimeout => {
                warn!(
                    project = %project,
                    idle_timeout = ?self.settings.idle_timeout,
                    policy = ?self.settings.on_idle_timeout,
                    "no output from restore process in a while; giving up on it"
                );
                match self.settings.on_idle_timeout {
                    IdlePolicy::Kill => kill_child(&mut child, &project).await,
                    IdlePolicy::Abandon => {
                        debug!(project = %project, "leaving idle restore process running");
                    }
                }
            }
            ProcessExit::Cancelled => {
                info!(project = %project, "restore cancelled; killing process");
                kill_child(&mut child, &project).await;
            }
            ProcessExit::FastFail(_) => {}
        }

        Ok(verdict)
    }
}

/// Race process exit against cancellation and the idle watchdog.
///
/// The watchdog ticks every `poll_interval` and fires once the clock has
/// been idle for at least `idle_timeout`. Only `Exited`, `IdleTimeout` and
/// `Cancelled` are produced here.
pub async fn monitor_exit<F>(
    exit: F,
    clock: &ActivityClock,
    settings: &MonitorSettings,
    cancel: &mut CancelSignal,
) -> io::Result<ProcessExit>
where
    F: Future<Output = io::Result<i32>>,
{
    tokio::pin!(exit);

    let mut ticker = tokio::time::interval(settings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            code = &mut exit => return code.map(ProcessExit::Exited),

            _ = cancel.cancelled() => return Ok(ProcessExit::Cancelled),

            _ = ticker.tick() => {
                if clock.idle_for() >= settings.idle_timeout {
                    return Ok(ProcessExit::IdleTimeout);
                }
            }
        }
    }
}

/// Read `reader` line by line until EOF, touching `clock` for every line
/// (empty ones included) and logging it: stdout at info, stderr at error.
///
/// Lines are decoded lossily, so output in a legacy code page never stops
/// the reader. The pipe stays drained until the child closes it.
pub async fn forward_lines<R>(
    reader: R,
    stream: OutputStream,
    clock: Arc<ActivityClock>,
    project: String,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                clock.touch();
                let line = String::from_utf8_lossy(trim_line_ending(&buf));
                match stream {
                    OutputStream::Stdout => info!(project = %project, "{line}"),
                    OutputStream::Stderr => error!(project = %project, "{line}"),
                }
            }
            Err(e) => {
                debug!(project = %project, ?stream, error = %e, "output stream read failed");
                break;
            }
        }
    }

    debug!(project = %project, ?stream, "output stream closed");
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

async fn kill_child(child: &mut Child, project: &str) {
    if let Err(e) = child.kill().await {
        warn!(
            project = %project,
            error = %e,
            "failed to kill restore process"
        );
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(FAILURE_EXIT_CODE)
}
