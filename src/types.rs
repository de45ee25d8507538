use std::path::{Path, PathBuf};

use serde::Deserialize;

/// What to do with a restore process that has gone quiet for longer than the
/// idle timeout.
///
/// - `Kill`: terminate the process and report failure (default).
/// - `Abandon`: stop monitoring and report failure, but leave the process
///   running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdlePolicy {
    Kill,
    Abandon,
}

impl Default for IdlePolicy {
    fn default() -> Self {
        IdlePolicy::Kill
    }
}

/// A single restore request as submitted by the host.
///
/// `path` is the project file and doubles as the exclusion key; `context_id`
/// is opaque and only echoed back in the completion message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectRequest {
    pub path: PathBuf,
    pub context_id: u64,
}

impl ProjectRequest {
    pub fn new(path: impl Into<PathBuf>, context_id: u64) -> Self {
        Self {
            path: path.into(),
            context_id,
        }
    }

    /// Directory the restore command runs in.
    ///
    /// A bare file name has an empty parent; that maps to `.`.
    pub fn working_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn key(&self) -> &Path {
        &self.path
    }

    /// File identity used in host events.
    pub fn file_name(&self) -> String {
        self.path.display().to_string()
    }
}

/// Final result of one accepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub project: PathBuf,
    pub exit_code: i32,
    pub succeeded: bool,
}

impl RestoreOutcome {
    pub fn from_exit_code(project: impl Into<PathBuf>, exit_code: i32) -> Self {
        Self {
            project: project.into(),
            exit_code,
            succeeded: exit_code == 0,
        }
    }
}
