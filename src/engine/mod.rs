// src/engine/mod.rs

//! Orchestration engine for restoreq.
//!
//! This module ties together:
//! - the per-project lock registry and the concurrency limiter
//!   ([`crate::sched`]),
//! - the restore backend ([`crate::exec`]),
//! - the host-facing collaborators: an [`EventReporter`] for start/finish
//!   notifications and a [`HostTransport`] for completion messages.
//!
//! [`RestoreOrchestrator::submit`] is the entry point; everything else in
//! here exists to make sure every submitted request ends in exactly one
//! outcome with all of its resources released.

pub mod events;
pub mod orchestrator;

pub use events::{
    ChannelEventReporter, ChannelTransport, EventReporter, HostMessage, HostTransport,
    RestoreEvent, TracingEventReporter, TracingTransport, RESTORE_COMPLETE,
};
pub use orchestrator::{RestoreHandle, RestoreOrchestrator};
