// src/exec/activity.rs

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// Timestamp of the most recent output line of one running process.
///
/// Stored as milliseconds since the clock was created so it can be shared
/// between the stdout reader, the stderr reader and the watchdog without a
/// lock. Uses tokio's clock so paused-time tests can drive it.
#[derive(Debug)]
pub struct ActivityClock {
    origin: Instant,
    last_ms: AtomicU64,
}

impl ActivityClock {
    /// A fresh clock counts as "active now".
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    /// Record activity at the current time. Never moves the clock backwards.
    pub fn touch(&self) {
        let now = self.origin.elapsed().as_millis() as u64;
        self.last_ms.fetch_max(now, Ordering::AcqRel);
    }

    pub fn last_activity(&self) -> Instant {
        self.origin + Duration::from_millis(self.last_ms.load(Ordering::Acquire))
    }

    /// Time since the last recorded activity.
    pub fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_activity())
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}
