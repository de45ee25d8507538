// src/sched/limiter.rs

//! System-wide cap on concurrently running restore processes.

use std::num::NonZero;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

use crate::errors::{RestoreError, Result};

/// Number of processors visible to this process, or 1 if unknown.
pub fn detected_processor_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZero::get)
        .unwrap_or(1)
}

/// Default cap for a machine with `processors` CPUs: half of them, at least 1.
pub fn cap_for_processor_count(processors: usize) -> usize {
    (processors / 2).max(1)
}

/// Counting gate in front of process spawning.
///
/// Cloning is cheap and clones share the same budget.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    limit: usize,
    running: Arc<AtomicUsize>,
}

impl ConcurrencyLimiter {
    /// A limit of 0 is raised to 1.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_processor_count(processors: usize) -> Self {
        Self::new(cap_for_processor_count(processors))
    }

    /// Wait for a free slot. The slot is returned when the permit is dropped.
    pub async fn acquire(&self) -> Result<SlotPermit> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| RestoreError::TaskFailed("concurrency limiter closed".to_string()))?;

        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(running, limit = self.limit, "concurrency slot acquired");

        Ok(SlotPermit {
            _permit: permit,
            running: Arc::clone(&self.running),
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Slots not currently handed out.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently handed out.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }
}

/// One unit of the concurrency budget.
#[derive(Debug)]
pub struct SlotPermit {
    _permit: OwnedSemaphorePermit,
    running: Arc<AtomicUsize>,
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        trace!("concurrency slot released");
    }
}
