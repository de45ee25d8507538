// src/config/mod.rs

//! Configuration loading and validation for restoreq.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate and resolve it into a [`RestoreConfig`] (`validate.rs`).
//! - Parse the small duration format used by `[monitor]` (`duration.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{
    HostSection, LimitsSection, MonitorSection, MonitorSettings, RawConfigFile, RestoreConfig,
    ToolsSection,
};
