// src/config/validate.rs

use std::path::PathBuf;
use std::time::Duration;

use tracing::error;

use crate::config::model::{ConfigFile, ConfigSection, RawConfigFile, SkippedRule};
use crate::errors::{DeployError, Result};
use crate::retry::RetryPolicy;
use crate::types::{DeploySettings, HumanDuration, WatchRule};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DeployError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let settings = validate_config_section(&raw.config)?;

        let mut rules = Vec::new();
        let mut skipped = Vec::new();
        for (name, value) in raw.settings.iter() {
            match parse_rule(name, value) {
                Ok(rule) => rules.push(rule),
                Err(err) => {
                    error!(rule = %name, error = %err, "skipping malformed rule");
                    skipped.push(SkippedRule {
                        name: name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        Ok(ConfigFile::new_unchecked(settings, rules, skipped))
    }
}

fn validate_config_section(cfg: &ConfigSection) -> Result<DeploySettings> {
    if cfg.remove_attempts == 0 {
        return Err(DeployError::ConfigError(
            "[config].remove_attempts must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.kill_attempts == 0 {
        return Err(DeployError::ConfigError(
            "[config].kill_attempts must be >= 1 (got 0)".to_string(),
        ));
    }

    let lock_poll = duration_field("lock_poll", &cfg.lock_poll)?;
    if lock_poll.is_zero() {
        return Err(DeployError::ConfigError(
            "[config].lock_poll must be greater than zero".to_string(),
        ));
    }

    Ok(DeploySettings {
        debounce: duration_field("debounce", &cfg.debounce)?,
        settle_delay: duration_field("settle_delay", &cfg.settle_delay)?,
        lock_wait_timeout: duration_field("lock_wait_timeout", &cfg.lock_wait_timeout)?,
        lock_poll,
        remove_retry: RetryPolicy::new(
            cfg.remove_attempts,
            duration_field("remove_backoff", &cfg.remove_backoff)?,
        ),
        kill_retry: RetryPolicy::new(
            cfg.kill_attempts,
            duration_field("kill_backoff", &cfg.kill_backoff)?,
        ),
        never_restart: cfg.never_restart.clone(),
    })
}

fn duration_field(field: &str, value: &str) -> Result<Duration> {
    value
        .parse::<HumanDuration>()
        .map(|d| d.0)
        .map_err(|e| DeployError::ConfigError(format!("[config].{field}: {e}")))
}

/// Parse one `[settings]` value: `process, source, target[, companion]`.
///
/// Double quotes anywhere in a field are dropped and surrounding whitespace
/// trimmed, so both `"A.exe", "x", "y"` and `A.exe, x, y` are accepted.
pub fn parse_rule(name: &str, value: &str) -> Result<WatchRule> {
    let parts: Vec<String> = value
        .split(',')
        .map(|p| p.replace('"', "").trim().to_string())
        .collect();

    if !(3..=4).contains(&parts.len()) {
        return Err(DeployError::ConfigError(format!(
            "rule '{name}' needs 3 or 4 comma-separated fields (process, source, target[, companion]), got {}",
            parts.len()
        )));
    }

    for (idx, label) in ["process", "source", "target"].iter().enumerate() {
        if parts[idx].is_empty() {
            return Err(DeployError::ConfigError(format!(
                "rule '{name}' has an empty {label} field"
            )));
        }
    }

    let companion_process = parts
        .get(3)
        .filter(|c| !c.is_empty())
        .cloned();

    Ok(WatchRule {
        name: name.to_string(),
        process_name: parts[0].clone(),
        source_path: PathBuf::from(&parts[1]),
        target_path: PathBuf::from(&parts[2]),
        companion_process,
    })
}
