// src/config/model.rs

use indexmap::IndexMap;
use serde::Deserialize;

use crate::types::{DeploySettings, WatchRule};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// debounce = "5s"
/// never_restart = ["arkwipe"]
///
/// [settings]
/// arkviewer = '"ArkViewer.exe", "//build/out/ArkViewer.exe", "C:/Ark/ArkViewer.exe"'
/// ```
///
/// `[settings]` keeps file order, which is also the order rules are
/// activated and swept at startup.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// Rule name -> `process, source, target[, companion]`.
    #[serde(default)]
    pub settings: IndexMap<String, String>,
}

/// `[config]` section. Durations are strings like `"100ms"` or `"5s"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigSection {
    /// Window in which repeated notifications for the same file and event
    /// kind count as one.
    #[serde(default = "default_debounce")]
    pub debounce: String,

    /// Pause after killing a process so the OS can release its handles.
    #[serde(default = "default_settle_delay")]
    pub settle_delay: String,

    /// How long to wait for a writer to release the source file.
    #[serde(default = "default_lock_wait_timeout")]
    pub lock_wait_timeout: String,

    #[serde(default = "default_lock_poll")]
    pub lock_poll: String,

    /// Attempts at deleting a locked target before giving up.
    #[serde(default = "default_attempts")]
    pub remove_attempts: u32,

    #[serde(default = "default_remove_backoff")]
    pub remove_backoff: String,

    /// Attempts at enumerating/terminating processes.
    #[serde(default = "default_attempts")]
    pub kill_attempts: u32,

    #[serde(default = "default_kill_backoff")]
    pub kill_backoff: String,

    #[serde(default)]
    pub never_restart: Vec<String>,
}

fn default_debounce() -> String {
    "5s".to_string()
}

fn default_settle_delay() -> String {
    "5s".to_string()
}

fn default_lock_wait_timeout() -> String {
    "60s".to_string()
}

fn default_lock_poll() -> String {
    "100ms".to_string()
}

fn default_attempts() -> u32 {
    10
}

fn default_remove_backoff() -> String {
    "3s".to_string()
}

fn default_kill_backoff() -> String {
    "1s".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            debounce: default_debounce(),
            settle_delay: default_settle_delay(),
            lock_wait_timeout: default_lock_wait_timeout(),
            lock_poll: default_lock_poll(),
            remove_attempts: default_attempts(),
            remove_backoff: default_remove_backoff(),
            kill_attempts: default_attempts(),
            kill_backoff: default_kill_backoff(),
            never_restart: Vec::new(),
        }
    }
}

/// A `[settings]` entry that could not be turned into a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRule {
    pub name: String,
    pub reason: String,
}

/// Validated configuration.
///
/// Construction goes through `TryFrom<RawConfigFile>`: a bad `[config]`
/// section fails the whole file, a malformed rule is only recorded in
/// `skipped`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub settings: DeploySettings,
    pub rules: Vec<WatchRule>,
    pub skipped: Vec<SkippedRule>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        settings: DeploySettings,
        rules: Vec<WatchRule>,
        skipped: Vec<SkippedRule>,
    ) -> Self {
        Self {
            settings,
            rules,
            skipped,
        }
    }
}
