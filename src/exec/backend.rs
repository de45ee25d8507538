// src/exec/backend.rs

//! Pluggable restore backend abstraction.
//!
//! The orchestrator talks to a `RestoreBackend` instead of spawning processes
//! itself. This makes it easy to swap in a fake backend in tests while
//! keeping the production process handling in [`runner`](super::runner).

use std::future::Future;
use std::pin::Pin;

use crate::config::MonitorSettings;
use crate::errors::Result;
use crate::exec::cancel::CancelSignal;
use crate::exec::runner::{ProcessExit, ProcessRunner, RestoreInvocation};

/// Trait abstracting how a restore invocation is executed.
///
/// Production code uses [`RealRestoreBackend`]; tests can provide their own
/// implementation that doesn't spawn real processes.
pub trait RestoreBackend: Send + Sync {
    /// Run one invocation to a terminal result.
    ///
    /// `Err` is reserved for internal faults (spawn failure, broken pipes);
    /// the orchestrator records those as a failed restore.
    fn run_restore(
        &self,
        invocation: RestoreInvocation,
        cancel: CancelSignal,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessExit>> + Send + '_>>;
}

/// Real backend used in production: one OS process per invocation.
#[derive(Debug, Clone, Copy)]
pub struct RealRestoreBackend {
    runner: ProcessRunner,
}

impl RealRestoreBackend {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            runner: ProcessRunner::new(settings),
        }
    }
}

impl RestoreBackend for RealRestoreBackend {
    fn run_restore(
        &self,
        invocation: RestoreInvocation,
        cancel: CancelSignal,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessExit>> + Send + '_>> {
        Box::pin(async move { self.runner.run(&invocation, cancel).await })
    }
}
