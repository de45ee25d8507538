// src/config/validate.rs

use crate::config::duration::parse_duration;
use crate::config::model::{MonitorSettings, RawConfigFile, RestoreConfig};
use crate::errors::{RestoreError, Result};
use crate::sched::limiter::{cap_for_processor_count, detected_processor_count};

impl TryFrom<RawConfigFile> for RestoreConfig {
    type Error = RestoreError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let program = raw
            .tools
            .resolve()
            .ok_or_else(|| {
                RestoreError::ConfigError(
                    "no restore tool configured: set [tools].primary or [tools].secondary"
                        .to_string(),
                )
            })?
            .to_path_buf();

        let max_concurrent = resolve_max_concurrent(&raw)?;
        let monitor = resolve_monitor(&raw)?;

        if raw.host.host_id.trim().is_empty() {
            return Err(RestoreError::ConfigError(
                "[host].host_id must not be empty".to_string(),
            ));
        }

        Ok(RestoreConfig::new_unchecked(
            program,
            max_concurrent,
            monitor,
            raw.host.host_id,
        ))
    }
}

fn resolve_max_concurrent(cfg: &RawConfigFile) -> Result<usize> {
    if let Some(max) = cfg.limits.max_concurrent {
        if max == 0 {
            return Err(RestoreError::ConfigError(
                "[limits].max_concurrent must be >= 1 (got 0)".to_string(),
            ));
        }
        return Ok(max);
    }

    let cpus = match cfg.limits.processor_count {
        Some(0) => {
            return Err(RestoreError::ConfigError(
                "[limits].processor_count must be >= 1 (got 0)".to_string(),
            ));
        }
        Some(n) => n,
        None => detected_processor_count(),
    };

    Ok(cap_for_processor_count(cpus))
}

fn resolve_monitor(cfg: &RawConfigFile) -> Result<MonitorSettings> {
    let idle_timeout = parse_duration(&cfg.monitor.idle_timeout)
        .map_err(|e| RestoreError::ConfigError(format!("[monitor].idle_timeout: {e}")))?;
    let poll_interval = parse_duration(&cfg.monitor.poll_interval)
        .map_err(|e| RestoreError::ConfigError(format!("[monitor].poll_interval: {e}")))?;

    if idle_timeout.is_zero() {
        return Err(RestoreError::ConfigError(
            "[monitor].idle_timeout must be greater than zero".to_string(),
        ));
    }
    if poll_interval.is_zero() {
        return Err(RestoreError::ConfigError(
            "[monitor].poll_interval must be greater than zero".to_string(),
        ));
    }
    if poll_interval > idle_timeout {
        return Err(RestoreError::ConfigError(format!(
            "[monitor].poll_interval ({:?}) must not exceed idle_timeout ({:?})",
            poll_interval, idle_timeout
        )));
    }

    Ok(MonitorSettings {
        idle_timeout,
        poll_interval,
        on_idle_timeout: cfg.monitor.on_idle_timeout,
    })
}
