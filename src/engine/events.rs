// src/engine/events.rs

//! Host-facing collaborator boundary.

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::errors::{RestoreError, Result};

/// Message type of the completion message posted after a successful restore.
pub const RESTORE_COMPLETE: &str = "RestoreComplete";

/// Start/finish notifications for the host UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreEvent {
    Started { file_name: String },
    Finished { file_name: String, succeeded: bool },
}

impl RestoreEvent {
    pub fn started(file_name: impl Into<String>) -> Self {
        RestoreEvent::Started {
            file_name: file_name.into(),
        }
    }

    pub fn finished(file_name: impl Into<String>, succeeded: bool) -> Self {
        RestoreEvent::Finished {
            file_name: file_name.into(),
            succeeded,
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            RestoreEvent::Started { file_name } | RestoreEvent::Finished { file_name, .. } => {
                file_name
            }
        }
    }

    /// Event type name as the host knows it.
    pub fn kind(&self) -> &'static str {
        match self {
            RestoreEvent::Started { .. } => "PackageRestoreStarted",
            RestoreEvent::Finished { .. } => "PackageRestoreFinished",
        }
    }
}

impl fmt::Display for RestoreEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreEvent::Started { file_name } => {
                write!(f, "{} FileName={}", self.kind(), file_name)
            }
            RestoreEvent::Finished {
                file_name,
                succeeded,
            } => write!(
                f,
                "{} FileName={} Succeeded={}",
                self.kind(),
                file_name,
                succeeded
            ),
        }
    }
}

/// Completion message for the host transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMessage {
    pub context_id: u64,
    pub message_type: String,
    pub host_id: String,
}

impl HostMessage {
    pub fn restore_complete(context_id: u64, host_id: impl Into<String>) -> Self {
        Self {
            context_id,
            message_type: RESTORE_COMPLETE.to_string(),
            host_id: host_id.into(),
        }
    }
}

impl fmt::Display for HostMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ContextId={} HostId={}",
            self.message_type, self.context_id, self.host_id
        )
    }
}

/// Receives start/finish events. Called concurrently from many runs.
pub trait EventReporter: Send + Sync {
    fn emit(&self, event: RestoreEvent);
}

/// Delivers completion messages to the host. Called concurrently from many
/// runs.
pub trait HostTransport: Send + Sync {
    fn post(&self, message: HostMessage) -> Result<()>;
}

/// Reporter that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventReporter;

impl EventReporter for TracingEventReporter {
    fn emit(&self, event: RestoreEvent) {
        info!(file = %event.file_name(), "{event}");
    }
}

/// Transport that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTransport;

impl HostTransport for TracingTransport {
    fn post(&self, message: HostMessage) -> Result<()> {
        info!(context_id = message.context_id, "{message}");
        Ok(())
    }
}

/// Reporter forwarding events over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelEventReporter {
    tx: mpsc::UnboundedSender<RestoreEvent>,
}

impl ChannelEventReporter {
    pub fn new(tx: mpsc::UnboundedSender<RestoreEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RestoreEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl EventReporter for ChannelEventReporter {
    fn emit(&self, event: RestoreEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!(event = %e.0, "event receiver dropped; discarding event");
        }
    }
}

/// Transport forwarding messages over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<HostMessage>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::UnboundedSender<HostMessage>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<HostMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl HostTransport for ChannelTransport {
    fn post(&self, message: HostMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|e| RestoreError::Transport(format!("host channel closed; dropped {}", e.0)))
    }
}
