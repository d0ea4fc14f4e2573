#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use autodeploy::clock::Clock;
use autodeploy::deploy::DeployContext;
use autodeploy::fs::FileSystem;
use autodeploy::process::ProcessController;
use autodeploy::retry::RetryPolicy;
use autodeploy::types::{DeploySettings, WatchRule};

/// Builder for `WatchRule` to simplify test setup.
///
/// Defaults: process `<name>.exe`, source `/build/<name>.exe`, target
/// `/srv/<name>.exe`, no companion.
pub struct RuleBuilder {
    rule: WatchRule,
}

impl RuleBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            rule: WatchRule {
                name: name.to_string(),
                process_name: format!("{name}.exe"),
                source_path: PathBuf::from(format!("/build/{name}.exe")),
                target_path: PathBuf::from(format!("/srv/{name}.exe")),
                companion_process: None,
            },
        }
    }

    pub fn process(mut self, process: &str) -> Self {
        self.rule.process_name = process.to_string();
        self
    }

    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.rule.source_path = path.into();
        self
    }

    pub fn target(mut self, path: impl Into<PathBuf>) -> Self {
        self.rule.target_path = path.into();
        self
    }

    pub fn companion(mut self, process: &str) -> Self {
        self.rule.companion_process = Some(process.to_string());
        self
    }

    pub fn build(self) -> WatchRule {
        self.rule
    }
}

/// Builder for `DeploySettings` with every wait shortened.
pub struct SettingsBuilder {
    settings: DeploySettings,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self {
            settings: DeploySettings::default(),
        }
    }

    /// Millisecond-scale waits, for tests on the real clock.
    pub fn fast() -> Self {
        Self::new()
            .debounce(Duration::from_millis(200))
            .settle_delay(Duration::from_millis(10))
            .lock_wait_timeout(Duration::from_secs(2))
            .lock_poll(Duration::from_millis(10))
            .remove_retry(3, Duration::from_millis(10))
            .kill_retry(3, Duration::from_millis(10))
    }

    pub fn debounce(mut self, d: Duration) -> Self {
        self.settings.debounce = d;
        self
    }

    pub fn settle_delay(mut self, d: Duration) -> Self {
        self.settings.settle_delay = d;
        self
    }

    pub fn lock_wait_timeout(mut self, d: Duration) -> Self {
        self.settings.lock_wait_timeout = d;
        self
    }

    pub fn lock_poll(mut self, d: Duration) -> Self {
        self.settings.lock_poll = d;
        self
    }

    pub fn remove_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.settings.remove_retry = RetryPolicy::new(attempts, backoff);
        self
    }

    pub fn kill_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.settings.kill_retry = RetryPolicy::new(attempts, backoff);
        self
    }

    pub fn never_restart(mut self, pattern: &str) -> Self {
        self.settings.never_restart.push(pattern.to_string());
        self
    }

    pub fn build(self) -> DeploySettings {
        self.settings
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Bundle collaborators into a `DeployContext`.
pub fn deploy_context(
    fs: impl FileSystem + 'static,
    processes: impl ProcessController + 'static,
    clock: impl Clock + 'static,
    settings: DeploySettings,
) -> DeployContext {
    DeployContext {
        fs: Arc::new(fs),
        processes: Arc::new(processes),
        clock: Arc::new(clock),
        settings: Arc::new(settings),
    }
}

/// Builder for config file text.
pub struct ConfigTextBuilder {
    config: Vec<String>,
    settings: Vec<String>,
}

impl ConfigTextBuilder {
    pub fn new() -> Self {
        Self {
            config: Vec::new(),
            settings: Vec::new(),
        }
    }

    /// `key = value` under `[config]`; `value` is raw TOML.
    pub fn config(mut self, key: &str, value: &str) -> Self {
        self.config.push(format!("{key} = {value}"));
        self
    }

    /// A rule whose fields are each double-quoted.
    pub fn rule(mut self, name: &str, fields: &[&str]) -> Self {
        let value = fields
            .iter()
            .map(|f| format!("\"{f}\""))
            .collect::<Vec<_>>()
            .join(", ");
        self.settings.push(format!("{name} = '{value}'"));
        self
    }

    /// A rule with its value written verbatim.
    pub fn raw_rule(mut self, name: &str, value: &str) -> Self {
        self.settings.push(format!("{name} = '{value}'"));
        self
    }

    pub fn build(self) -> String {
        let mut out = String::new();
        if !self.config.is_empty() {
            out.push_str("[config]\n");
            for line in &self.config {
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
        }
        out.push_str("[settings]\n");
        for line in &self.settings {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

impl Default for ConfigTextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
