#![allow(dead_code)]

use std::path::PathBuf;

use restoreq::config::{RawConfigFile, RestoreConfig};
use restoreq::types::IdlePolicy;

/// Builder for `RestoreConfig` to simplify test setup.
///
/// Starts from the defaults with `restore-tool` as the primary tool.
pub struct ConfigBuilder {
    config: RawConfigFile,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut config = RawConfigFile::default();
        config.tools.primary = Some(PathBuf::from("restore-tool"));
        Self { config }
    }

    pub fn primary(mut self, path: &str) -> Self {
        self.config.tools.primary = Some(PathBuf::from(path));
        self
    }

    pub fn no_primary(mut self) -> Self {
        self.config.tools.primary = None;
        self
    }

    pub fn secondary(mut self, path: &str) -> Self {
        self.config.tools.secondary = Some(PathBuf::from(path));
        self
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.config.limits.max_concurrent = Some(n);
        self
    }

    pub fn processor_count(mut self, n: usize) -> Self {
        self.config.limits.processor_count = Some(n);
        self
    }

    pub fn idle_timeout(mut self, dur: &str) -> Self {
        self.config.monitor.idle_timeout = dur.to_string();
        self
    }

    pub fn poll_interval(mut self, dur: &str) -> Self {
        self.config.monitor.poll_interval = dur.to_string();
        self
    }

    pub fn on_idle_timeout(mut self, policy: IdlePolicy) -> Self {
        self.config.monitor.on_idle_timeout = policy;
        self
    }

    pub fn host_id(mut self, id: &str) -> Self {
        self.config.host.host_id = id.to_string();
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> RestoreConfig {
        RestoreConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
