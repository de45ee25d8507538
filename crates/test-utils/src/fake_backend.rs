use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use restoreq::errors::{RestoreError, Result};
use restoreq::exec::{CancelSignal, ProcessExit, RestoreBackend, RestoreInvocation};

/// What one scripted run does once it is allowed to finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Report this exit code.
    Exit(i32),
    /// Report an idle timeout.
    IdleTimeout,
    /// Return an internal error.
    Fail(String),
    /// Panic inside the backend.
    Panic,
    /// Never finish on its own; only cancellation ends it.
    Hang,
}

/// Something the backend observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Started(PathBuf),
    Finished(PathBuf),
}

/// A fake backend that:
/// - plays back a per-project list of [`Step`]s (default `Exit(0)`)
/// - optionally holds every run until the test releases it
/// - tracks how many runs are in flight and the peak
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<PathBuf, VecDeque<Step>>>,
    gate: Option<Arc<Semaphore>>,
    running: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<Call>>,
    invocations: Mutex<Vec<RestoreInvocation>>,
}

impl ScriptedBackend {
    /// Every run finishes immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every run waits for [`release`](Self::release) before finishing.
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub fn script(self, project: impl AsRef<Path>, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(project.as_ref().to_path_buf(), steps.into());
        self
    }

    /// Let `n` gated runs finish.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn started_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Started(_)))
            .count()
    }

    pub fn invocations(&self) -> Vec<RestoreInvocation> {
        self.invocations.lock().unwrap().clone()
    }

    fn next_step(&self, project: &Path) -> Step {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(project)
            .and_then(|steps| steps.pop_front())
            .unwrap_or(Step::Exit(0))
    }
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RestoreBackend for ScriptedBackend {
    fn run_restore(
        &self,
        invocation: RestoreInvocation,
        mut cancel: CancelSignal,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessExit>> + Send + '_>> {
        Box::pin(async move {
            let project = invocation.project.clone();
            let step = self.next_step(&project);
            self.invocations.lock().unwrap().push(invocation);

            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let _running = RunningGuard(&self.running);
            self.calls.lock().unwrap().push(Call::Started(project.clone()));

            if let Some(gate) = &self.gate {
                tokio::select! {
                    permit = gate.acquire() => {
                        if let Ok(permit) = permit {
                            permit.forget();
                        }
                    }
                    _ = cancel.cancelled() => {
                        self.calls.lock().unwrap().push(Call::Finished(project));
                        return Ok(ProcessExit::Cancelled);
                    }
                }
            }

            let result = match step {
                Step::Exit(code) => Ok(ProcessExit::Exited(code)),
                Step::IdleTimeout => Ok(ProcessExit::IdleTimeout),
                Step::Fail(msg) => Err(RestoreError::Other(anyhow::anyhow!(msg))),
                Step::Panic => panic!("scripted backend panic for {}", project.display()),
                Step::Hang => {
                    cancel.cancelled().await;
                    Ok(ProcessExit::Cancelled)
                }
            };

            self.calls.lock().unwrap().push(Call::Finished(project));
            result
        })
    }
}
