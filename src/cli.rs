// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};

/// Directory name used for log files when `--log-dir` is not given.
pub const DEFAULT_LOG_DIR: &str = ".autodeploy-logs";

/// Command-line arguments for `autodeploy`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "autodeploy",
    version,
    about = "Hot-swap build outputs into place and restart the processes using them.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Autodeploy.toml` in the current working directory. A
    /// template is written there if it does not exist.
    #[arg(long, value_name = "PATH", default_value = "Autodeploy.toml")]
    pub config: PathBuf,

    /// Deploy every rule once, then exit without watching.
    #[arg(long)]
    pub once: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `AUTODEPLOY_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Also append logs to `<DIR>/<hostname>.log`.
    ///
    /// Default: `.autodeploy-logs` next to the config file.
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Log to stderr only.
    #[arg(long, conflicts_with = "log_dir")]
    pub no_log_file: bool,

    /// Parse + validate, print rules and timings, but don't deploy anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    /// Directory for the log file, or `None` when file logging is off.
    pub fn effective_log_dir(&self) -> Option<PathBuf> {
        if self.no_log_file {
            return None;
        }
        Some(match &self.log_dir {
            Some(dir) => dir.clone(),
            None => config_dir(&self.config).join(DEFAULT_LOG_DIR),
        })
    }
}

/// Directory containing the config file (`.` for a bare file name).
pub fn config_dir(config: &Path) -> PathBuf {
    match config.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
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
