// src/exec/cancel.rs

//! Cancellation for restore runs.
//!
//! A [`CancelSource`] owns the flag; any number of [`CancelSignal`]s observe
//! it. A signal can watch two sources at once (the run's own handle and the
//! orchestrator-wide shutdown) and fires when either is cancelled.

use std::future::pending;

use tokio::sync::watch;

#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            run: Some(self.tx.subscribe()),
            shutdown: None,
        }
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    run: Option<watch::Receiver<bool>>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self::default()
    }

    /// Also fire when `shutdown` is cancelled.
    pub fn with_shutdown(mut self, shutdown: &CancelSource) -> Self {
        self.shutdown = Some(shutdown.tx.subscribe());
        self
    }

    pub fn is_cancelled(&self) -> bool {
        flag(&self.run) || flag(&self.shutdown)
    }

    /// Resolves once cancelled. Pends forever if every source is dropped
    /// without cancelling. Cancel safe.
    pub async fn cancelled(&mut self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            tokio::select! {
                _ = changed(&mut self.run) => {}
                _ = changed(&mut self.shutdown) => {}
            }
        }
    }
}

fn flag(rx: &Option<watch::Receiver<bool>>) -> bool {
    rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
}

async fn changed(rx: &mut Option<watch::Receiver<bool>>) {
    let closed = match rx.as_mut() {
        Some(inner) => inner.changed().await.is_err(),
        None => true,
    };
    if closed {
        // Source dropped without cancelling.
        *rx = None;
        pending::<()>().await;
    }
}
