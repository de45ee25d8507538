// src/engine/orchestrator.rs

//! Restore orchestrator: one tokio task per request, serialized per project
//! and bounded system-wide.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::RestoreConfig;
use crate::engine::events::{EventReporter, HostMessage, HostTransport, RestoreEvent};
use crate::exec::runner::{FAILURE_EXIT_CODE, RestoreInvocation};
use crate::exec::{CancelSignal, CancelSource, RealRestoreBackend, RestoreBackend};
use crate::sched::{ConcurrencyLimiter, ExclusionTicket, ProjectGuard, ProjectLockRegistry, SlotPermit};
use crate::types::{ProjectRequest, RestoreOutcome};

struct Inner {
    program: PathBuf,
    host_id: String,
    locks: ProjectLockRegistry,
    limiter: ConcurrencyLimiter,
    backend: Arc<dyn RestoreBackend>,
    reporter: Arc<dyn EventReporter>,
    transport: Arc<dyn HostTransport>,
    shutdown: CancelSource,
}

/// Accepts restore requests and drives each one to exactly one outcome.
///
/// Cloning is cheap; clones share locks, limiter and collaborators.
#[derive(Clone)]
pub struct RestoreOrchestrator {
    inner: Arc<Inner>,
}

impl fmt::Debug for RestoreOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestoreOrchestrator")
            .field("program", &self.inner.program)
            .field("host_id", &self.inner.host_id)
            .field("limiter", &self.inner.limiter)
            .finish_non_exhaustive()
    }
}

impl RestoreOrchestrator {
    pub fn new(
        config: &RestoreConfig,
        backend: Arc<dyn RestoreBackend>,
        reporter: Arc<dyn EventReporter>,
        transport: Arc<dyn HostTransport>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                program: config.restore_program.clone(),
                host_id: config.host_id.clone(),
                locks: ProjectLockRegistry::new(),
                limiter: ConcurrencyLimiter::new(config.max_concurrent),
                backend,
                reporter,
                transport,
                shutdown: CancelSource::new(),
            }),
        }
    }

    /// Orchestrator that runs real processes.
    pub fn with_process_backend(
        config: &RestoreConfig,
        reporter: Arc<dyn EventReporter>,
        transport: Arc<dyn HostTransport>,
    ) -> Self {
        let backend = Arc::new(RealRestoreBackend::new(config.monitor));
        Self::new(config, backend, reporter, transport)
    }

    /// Schedule a restore and return immediately.
    ///
    /// The project's queue position is taken here, so requests for the same
    /// project run in the order `submit` was called. Must be called from
    /// within a tokio runtime.
    pub fn submit(&self, project: ProjectRequest) -> RestoreHandle {
        let ticket = self.inner.locks.acquire(project.key());
        let cancel = CancelSource::new();
        let signal = cancel.signal().with_shutdown(&self.inner.shutdown);

        info!(
            project = %project.path.display(),
            context_id = project.context_id,
            "restore requested"
        );

        let path = project.path.clone();
        let inner = Arc::clone(&self.inner);
        let join = tokio::spawn(run_request(inner, project, ticket, signal));

        RestoreHandle {
            project: path,
            cancel,
            join,
        }
    }

    /// Cancel every queued and running restore. Cancelled runs still emit
    /// their finish events and release their resources.
    pub fn shutdown(&self) {
        info!("shutdown requested; cancelling restores");
        self.inner.shutdown.cancel();
    }

    pub fn locks(&self) -> &ProjectLockRegistry {
        &self.inner.locks
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.inner.limiter
    }

    pub fn program(&self) -> &Path {
        &self.inner.program
    }
}

/// Handle to one submitted restore.
#[derive(Debug)]
pub struct RestoreHandle {
    project: PathBuf,
    cancel: CancelSource,
    join: JoinHandle<RestoreOutcome>,
}

impl RestoreHandle {
    pub fn project(&self) -> &Path {
        &self.project
    }

    /// Request cancellation. A running process is killed. A request still
    /// waiting for its project finishes at once without any events; one
    /// waiting for a slot finishes at once with its finish event.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the outcome. A run that died of a panic is reported as a
    /// failed restore.
    pub async fn wait(self) -> RestoreOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    project = %self.project.display(),
                    error = %e,
                    "restore task did not complete"
                );
                RestoreOutcome::from_exit_code(self.project, FAILURE_EXIT_CODE)
            }
        }
    }
}

/// Resources held by a run after it was started. Dropping it performs the
/// cleanup step on every exit path, unwinding included: the slot goes back
/// first, then the finish event is emitted, then the project lock is
/// released. The finish event goes out while the lock is still held so the
/// next run of the same project cannot announce itself first.
struct RunScope {
    reporter: Arc<dyn EventReporter>,
    project: PathBuf,
    file_name: String,
    exit_code: i32,
    slot: Option<SlotPermit>,
    lock: Option<ProjectGuard>,
}

impl RunScope {
    fn finish(self) -> RestoreOutcome {
        let outcome = RestoreOutcome::from_exit_code(self.project.clone(), self.exit_code);
        drop(self);
        outcome
    }
}

impl Drop for RunScope {
    fn drop(&mut self) {
        drop(self.slot.take());
        self.reporter
            .emit(RestoreEvent::finished(&self.file_name, self.exit_code == 0));
        drop(self.lock.take());
        debug!(
            project = %self.project.display(),
            exit_code = self.exit_code,
            "restore cleanup complete"
        );
    }
}

async fn run_request(
    inner: Arc<Inner>,
    project: ProjectRequest,
    ticket: ExclusionTicket,
    mut cancel: CancelSignal,
) -> RestoreOutcome {
    let waited = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        waited = ticket.wait() => Some(waited),
    };
    let guard = match waited {
        Some(Ok(guard)) => guard,
        None => {
            info!(
                project = %project.path.display(),
                "restore cancelled while waiting for the project"
            );
            return RestoreOutcome::from_exit_code(project.path, FAILURE_EXIT_CODE);
        }
        Some(Err(e)) => {
            error!(
                project = %project.path.display(),
                error = %e,
                "could not obtain project lock"
            );
            return RestoreOutcome::from_exit_code(project.path, FAILURE_EXIT_CODE);
        }
    };

    let file_name = project.file_name();
    inner.reporter.emit(RestoreEvent::started(&file_name));

    let mut scope = RunScope {
        reporter: Arc::clone(&inner.reporter),
        project: project.path.clone(),
        file_name,
        exit_code: FAILURE_EXIT_CODE,
        slot: None,
        lock: Some(guard),
    };

    let acquired = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        acquired = inner.limiter.acquire() => Some(acquired),
    };
    match acquired {
        Some(Ok(permit)) => scope.slot = Some(permit),
        None => {
            info!(
                project = %project.path.display(),
                "restore cancelled while waiting for a slot"
            );
            return scope.finish();
        }
        Some(Err(e)) => {
            error!(
                project = %project.path.display(),
                error = %e,
                "could not obtain concurrency slot"
            );
            return scope.finish();
        }
    }

    let invocation = RestoreInvocation::for_project(&inner.program, &project);
    info!(
        project = %project.path.display(),
        cmd = %invocation.command_line(),
        running = inner.limiter.running(),
        limit = inner.limiter.limit(),
        "dispatching restore"
    );

    scope.exit_code = match inner.backend.run_restore(invocation, cancel).await {
        Ok(exit) => exit.code(),
        Err(e) => {
            error!(
                project = %project.path.display(),
                error = %e,
                "restore run failed"
            );
            FAILURE_EXIT_CODE
        }
    };

    if scope.exit_code == 0 {
        let message = HostMessage::restore_complete(project.context_id, &inner.host_id);
        match inner.transport.post(message) {
            Ok(()) => info!(
                project = %project.path.display(),
                context_id = project.context_id,
                "restore complete; host notified"
            ),
            Err(e) => error!(
                project = %project.path.display(),
                error = %e,
                "failed to notify host of completed restore"
            ),
        }
    }

    scope.finish()
}
