use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use restoreq::engine::{EventReporter, HostMessage, HostTransport, RestoreEvent};
use restoreq::errors::{RestoreError, Result};

/// Reporter that keeps every event in order.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    events: Arc<Mutex<Vec<RestoreEvent>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RestoreEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Events for one project file, in order.
    pub fn events_for(&self, file_name: &str) -> Vec<RestoreEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.file_name() == file_name)
            .collect()
    }
}

impl EventReporter for RecordingReporter {
    fn emit(&self, event: RestoreEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Transport that keeps every message, optionally failing every post.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    messages: Arc<Mutex<Vec<HostMessage>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let t = Self::default();
        t.fail.store(true, Ordering::SeqCst);
        t
    }

    pub fn messages(&self) -> Vec<HostMessage> {
        self.messages.lock().unwrap().clone()
    }
}

impl HostTransport for RecordingTransport {
    fn post(&self, message: HostMessage) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RestoreError::Transport("recording transport set to fail".to_string()));
        }
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}
