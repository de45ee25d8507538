// src/sched/mod.rs

//! Admission control for restore runs.
//!
//! - [`locks`] keeps at most one run per project in flight and serves
//!   repeated requests for a project in submission order.
//! - [`limiter`] bounds how many restore processes run at once, system-wide.

pub mod limiter;
pub mod locks;

pub use limiter::{ConcurrencyLimiter, SlotPermit};
pub use locks::{ExclusionTicket, ProjectGuard, ProjectLockRegistry};
