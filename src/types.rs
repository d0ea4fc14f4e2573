// src/types.rs

//! Domain types shared across modules.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// One deployable artifact: copy `source_path` over `target_path` and bounce
/// `process_name` around the swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRule {
    /// Key of the rule in `[settings]`.
    pub name: String,
    pub process_name: String,
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    /// Helper process that must also be stopped before the swap (e.g. an
    /// exporter that keeps the target's directory busy).
    pub companion_process: Option<String>,
}

impl WatchRule {
    /// Directory whose notifications drive this rule.
    pub fn source_dir(&self) -> PathBuf {
        match self.source_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn source_file_name(&self) -> Option<&std::ffi::OsStr> {
        self.source_path.file_name()
    }

    /// `<target dir>/<target stem>.tmp`, the staging file for the swap.
    pub fn temp_path(&self) -> PathBuf {
        temp_path_for(&self.target_path)
    }
}

pub fn temp_path_for(target: &Path) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "autodeploy".into());
    let mut name = stem;
    name.push(".tmp");
    let tmp = target.with_file_name(&name);
    if tmp == target {
        // A `.tmp` target would stage onto itself.
        name.push(".autodeploy");
        return target.with_file_name(name);
    }
    tmp
}

/// Typed, validated form of the `[config]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploySettings {
    pub debounce: Duration,
    pub settle_delay: Duration,
    pub lock_wait_timeout: Duration,
    pub lock_poll: Duration,
    pub remove_retry: RetryPolicy,
    pub kill_retry: RetryPolicy,
    /// Case-insensitive substrings; a target path containing any of them is
    /// never restarted after a swap.
    pub never_restart: Vec<String>,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(5),
            settle_delay: Duration::from_secs(5),
            lock_wait_timeout: Duration::from_secs(60),
            lock_poll: Duration::from_millis(100),
            remove_retry: RetryPolicy::new(10, Duration::from_secs(3)),
            kill_retry: RetryPolicy::new(10, Duration::from_secs(1)),
            never_restart: Vec::new(),
        }
    }
}

impl DeploySettings {
    pub fn is_restart_excluded(&self, target: &Path) -> bool {
        let haystack = target.to_string_lossy().to_lowercase();
        self.never_restart
            .iter()
            .filter(|s| !s.trim().is_empty())
            .any(|s| haystack.contains(&s.trim().to_lowercase()))
    }
}

/// Duration written as `<n>ms`, `<n>s`, `<n>m` or `<n>h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanDuration(pub Duration);

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty duration string".to_string());
        }

        let idx = s
            .chars()
            .position(|c| !c.is_ascii_digit())
            .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

        let (num_part, unit_part) = s.split_at(idx);
        let value: u64 = num_part
            .parse()
            .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;

        let secs_per_unit = match unit_part.trim().to_lowercase().as_str() {
            "ms" => return Ok(Self(Duration::from_millis(value))),
            "s" => 1,
            "m" => 60,
            "h" => 60 * 60,
            unit => {
                return Err(format!(
                    "unsupported duration unit '{unit}'; expected ms, s, m, or h"
                ));
            }
        };
        value
            .checked_mul(secs_per_unit)
            .map(|secs| Self(Duration::from_secs(secs)))
            .ok_or_else(|| format!("duration '{s}' is too large"))
    }
}
