// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::types::IdlePolicy;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [tools]
/// primary = "/opt/sdk/bin/dnu"
/// secondary = "kpm"
///
/// [limits]
/// max_concurrent = 2
///
/// [monitor]
/// idle_timeout = "20s"
/// poll_interval = "100ms"
/// on_idle_timeout = "kill"
///
/// [host]
/// host_id = "editor-1"
/// ```
///
/// All sections are optional and have defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub tools: ToolsSection,

    #[serde(default)]
    pub limits: LimitsSection,

    #[serde(default)]
    pub monitor: MonitorSection,

    #[serde(default)]
    pub host: HostSection,
}

/// `[tools]` section: where the restore command lives.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolsSection {
    /// Preferred restore tool.
    #[serde(default)]
    pub primary: Option<PathBuf>,

    /// Used only when `primary` is unset.
    #[serde(default)]
    pub secondary: Option<PathBuf>,
}

impl ToolsSection {
    pub fn resolve(&self) -> Option<&Path> {
        self.primary.as_deref().or(self.secondary.as_deref())
    }
}

/// `[limits]` section.
///
/// When neither field is set the cap is `max(1, detected_cpus / 2)`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitsSection {
    /// Overrides the detected processor count used to derive the cap.
    #[serde(default)]
    pub processor_count: Option<usize>,

    /// Explicit cap on concurrently running restore processes.
    #[serde(default)]
    pub max_concurrent: Option<usize>,
}

/// `[monitor]` section, kept as raw strings until validation.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    #[serde(default)]
    pub on_idle_timeout: IdlePolicy,
}

fn default_idle_timeout() -> String {
    "20s".to_string()
}

fn default_poll_interval() -> String {
    "100ms".to_string()
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            idle_timeout: default_idle_timeout(),
            poll_interval: default_poll_interval(),
            on_idle_timeout: IdlePolicy::default(),
        }
    }
}

/// `[host]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct HostSection {
    /// Echoed in every completion message.
    #[serde(default = "default_host_id")]
    pub host_id: String,
}

fn default_host_id() -> String {
    "restoreq".to_string()
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            host_id: default_host_id(),
        }
    }
}

/// Parsed `[monitor]` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub idle_timeout: Duration,
    pub poll_interval: Duration,
    pub on_idle_timeout: IdlePolicy,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(20),
            poll_interval: Duration::from_millis(100),
            on_idle_timeout: IdlePolicy::default(),
        }
    }
}

/// Validated configuration. Obtain one through `RestoreConfig::try_from`.
#[derive(Debug, Clone)]
pub struct RestoreConfig {
    pub restore_program: PathBuf,
    pub max_concurrent: usize,
    pub monitor: MonitorSettings,
    pub host_id: String,
}

impl RestoreConfig {
    pub(crate) fn new_unchecked(
        restore_program: PathBuf,
        max_concurrent: usize,
        monitor: MonitorSettings,
        host_id: String,
    ) -> Self {
        Self {
            restore_program,
            max_concurrent,
            monitor,
            host_id,
        }
    }
}
