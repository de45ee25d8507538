// src/sched/locks.rs

//! Per-project exclusion.
//!
//! Each project key owns a ticket queue. [`ProjectLockRegistry::acquire`]
//! hands out the next ticket number synchronously, so requests for one key
//! are served in the order they called `acquire`, independent of how the
//! async tasks that await the tickets get scheduled.
//!
//! The registry mutex only guards the map. Waiting for a turn happens on a
//! per-key `watch` channel that carries the ticket number currently being
//! served, outside that critical section.
//!
//! A key's entry is created lazily and removed once no ticket for it is
//! outstanding, so a later request never observes a stale queue.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, trace};

use crate::errors::{RestoreError, Result};

#[derive(Debug)]
struct KeyQueue {
    next_ticket: u64,
    serving: watch::Sender<u64>,
    /// Tickets dropped before their turn came.
    abandoned: BTreeSet<u64>,
    /// Tickets handed out and not yet released or abandoned.
    outstanding: usize,
}

impl KeyQueue {
    fn new() -> Self {
        let (serving, _) = watch::channel(0);
        Self {
            next_ticket: 0,
            serving,
            abandoned: BTreeSet::new(),
            outstanding: 0,
        }
    }

    /// Move past `current` and any abandoned tickets right behind it.
    fn advance_from(&mut self, current: u64) {
        let mut next = current + 1;
        while self.abandoned.remove(&next) {
            next += 1;
        }
        self.serving.send_replace(next);
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    queues: Mutex<HashMap<PathBuf, KeyQueue>>,
}

impl RegistryInner {
    fn queues(&self) -> MutexGuard<'_, HashMap<PathBuf, KeyQueue>> {
        // Critical sections never panic midway, so a poisoned map is still
        // consistent.
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release(&self, key: &Path, number: u64) {
        let mut queues = self.queues();
        let Some(queue) = queues.get_mut(key) else {
            return;
        };

        queue.outstanding = queue.outstanding.saturating_sub(1);
        queue.advance_from(number);
        trace!(project = %key.display(), ticket = number, "project lock released");

        if queue.outstanding == 0 {
            queues.remove(key);
            debug!(project = %key.display(), "project lock entry removed");
        }
    }

    fn abandon(&self, key: &Path, number: u64) {
        let mut queues = self.queues();
        let Some(queue) = queues.get_mut(key) else {
            return;
        };

        queue.outstanding = queue.outstanding.saturating_sub(1);
        if *queue.serving.borrow() == number {
            queue.advance_from(number);
        } else {
            queue.abandoned.insert(number);
        }
        trace!(project = %key.display(), ticket = number, "project lock ticket abandoned");

        if queue.outstanding == 0 {
            queues.remove(key);
        }
    }
}

/// Map from project key to its exclusion queue.
///
/// Cloning is cheap; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct ProjectLockRegistry {
    inner: Arc<RegistryInner>,
}

impl ProjectLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next place in `key`'s queue.
    ///
    /// Never blocks beyond the short map critical section; await
    /// [`ExclusionTicket::wait`] to actually obtain exclusion.
    pub fn acquire(&self, key: impl AsRef<Path>) -> ExclusionTicket {
        let key = key.as_ref();
        let mut queues = self.inner.queues();
        let queue = queues
            .entry(key.to_path_buf())
            .or_insert_with(KeyQueue::new);

        let number = queue.next_ticket;
        queue.next_ticket += 1;
        queue.outstanding += 1;
        let serving = queue.serving.subscribe();

        trace!(
            project = %key.display(),
            ticket = number,
            waiting = queue.outstanding - 1,
            "project lock ticket issued"
        );

        ExclusionTicket {
            slot: Some(TicketSlot {
                registry: Arc::clone(&self.inner),
                key: key.to_path_buf(),
                number,
            }),
            serving,
        }
    }

    /// Whether any ticket for `key` is outstanding.
    pub fn contains(&self, key: impl AsRef<Path>) -> bool {
        self.inner.queues().contains_key(key.as_ref())
    }

    /// Number of tickets for `key` that are held or waiting.
    pub fn outstanding(&self, key: impl AsRef<Path>) -> usize {
        self.inner
            .queues()
            .get(key.as_ref())
            .map(|q| q.outstanding)
            .unwrap_or(0)
    }

    /// Number of keys with an entry.
    pub fn len(&self) -> usize {
        self.inner.queues().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct TicketSlot {
    registry: Arc<RegistryInner>,
    key: PathBuf,
    number: u64,
}

/// A place in a project's queue. Dropping it before it is served gives the
/// place up without blocking anyone behind it.
#[derive(Debug)]
pub struct ExclusionTicket {
    slot: Option<TicketSlot>,
    serving: watch::Receiver<u64>,
}

impl ExclusionTicket {
    pub fn key(&self) -> Option<&Path> {
        self.slot.as_ref().map(|s| s.key.as_path())
    }

    /// Wait until every earlier ticket for this key has been released.
    pub async fn wait(mut self) -> Result<ProjectGuard> {
        let number = match &self.slot {
            Some(slot) => slot.number,
            None => {
                return Err(RestoreError::TaskFailed(
                    "exclusion ticket already consumed".to_string(),
                ));
            }
        };

        self.serving
            .wait_for(|serving| *serving == number)
            .await
            .map_err(|_| RestoreError::TaskFailed("project lock queue dropped".to_string()))?;

        match self.slot.take() {
            Some(slot) => Ok(ProjectGuard { slot }),
            None => Err(RestoreError::TaskFailed(
                "exclusion ticket already consumed".to_string(),
            )),
        }
    }
}

impl Drop for ExclusionTicket {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.registry.abandon(&slot.key, slot.number);
        }
    }
}

/// Exclusive right to restore one project. Released on drop.
#[derive(Debug)]
pub struct ProjectGuard {
    slot: TicketSlot,
}

impl ProjectGuard {
    pub fn key(&self) -> &Path {
        &self.slot.key
    }

    /// Release explicitly; equivalent to dropping the guard.
    pub fn release(self) {}
}

impl Drop for ProjectGuard {
    fn drop(&mut self) {
        self.slot.registry.release(&self.slot.key, self.slot.number);
    }
}
