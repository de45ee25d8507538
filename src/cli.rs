// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `restoreq`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "restoreq",
    version,
    about = "Run package restores for projects, one at a time per project and a bounded number at once.",
    long_about = None
)]
pub struct CliArgs {
    /// Project files to restore. Each restore runs in the file's directory.
    #[arg(value_name = "PROJECT", required = true)]
    pub projects: Vec<PathBuf>,

    /// Path to the config file (TOML).
    ///
    /// If omitted, `Restoreq.toml` in the current directory is used when it
    /// exists; otherwise built-in defaults apply.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Restore tool to run; overrides `[tools].primary`.
    #[arg(long, value_name = "PATH")]
    pub tool: Option<PathBuf>,

    /// Host id echoed in completion messages; overrides `[host].host_id`.
    #[arg(long, value_name = "ID")]
    pub host_id: Option<String>,

    /// Maximum number of concurrent restore processes; overrides
    /// `[limits].max_concurrent`.
    #[arg(long, value_name = "N")]
    pub max_concurrent: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RESTOREQ_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Resolve config and print the commands that would run, without running
    /// them.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
