// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running the restore command,
//! using `tokio::process::Command`, and turning whatever the process does
//! into a single [`ProcessExit`].
//!
//! - [`runner`] spawns one process, forwards its output and watches it for
//!   exit, idleness and cancellation.
//! - [`activity`] holds the last-output clock shared by the stream readers
//!   and the idle watchdog.
//! - [`cancel`] provides the cancellation signal threaded through a run.
//! - [`backend`] provides the `RestoreBackend` trait and the
//!   `RealRestoreBackend` the orchestrator uses in production, and which
//!   tests can replace with a fake implementation.

pub mod activity;
pub mod backend;
pub mod cancel;
pub mod runner;

pub use activity::ActivityClock;
pub use backend::{RealRestoreBackend, RestoreBackend};
pub use cancel::{CancelSignal, CancelSource};
pub use runner::{OutputStream, ProcessExit, ProcessRunner, RestoreInvocation};
