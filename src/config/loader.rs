// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawConfigFile, RestoreConfig};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw
/// `RawConfigFile`.
///
/// This only performs TOML deserialization; use [`load_and_validate`] to get
/// a usable [`RestoreConfig`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<RestoreConfig> {
    let raw_config = load_from_path(&path)?;
    RestoreConfig::try_from(raw_config)
}

/// Load the raw config for the CLI.
///
/// - An explicit path must exist.
/// - Without one, [`default_config_path`] is used if present, otherwise all
///   defaults apply.
pub fn load_or_default(explicit: Option<&Path>) -> Result<RawConfigFile> {
    match explicit {
        Some(path) => load_from_path(path),
        None => {
            let path = default_config_path();
            if path.is_file() {
                load_from_path(&path)
            } else {
                debug!(path = %path.display(), "no config file found; using defaults");
                Ok(RawConfigFile::default())
            }
        }
    }
}

/// Default config location: `Restoreq.toml` in the current directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Restoreq.toml")
}
