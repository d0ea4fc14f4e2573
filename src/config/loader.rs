// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Written when no config file exists yet. Every `[config]` key is shown
/// with its default.
pub const DEFAULT_SCAFFOLD: &str = r#"# autodeploy configuration
#
# Each entry under [settings] is one watch rule:
#   name = '"<process name>", "<source file>", "<target file>"[, "<companion process>"]'
# The source file is watched; when its content changes the process is
# stopped, the target replaced, and the process started again.

[config]
debounce = "5s"
settle_delay = "5s"
lock_wait_timeout = "60s"
lock_poll = "100ms"
remove_attempts = 10
remove_backoff = "3s"
kill_attempts = 10
kill_backoff = "1s"
never_restart = []

[settings]
arkviewer = '"ArkViewer.exe", "Path/To/Source/File", "Path/To/Target/File"'
arkhandler = '"ArkHandler.exe", "Path/To/Source/File", "Path/To/Target/File"'
"#;

/// Result of [`load_or_scaffold`].
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(ConfigFile),
    /// No config existed; a default one was written at this path.
    Scaffolded(PathBuf),
}

/// Load a configuration file and return the raw `RawConfigFile`.
///
/// Only TOML deserialization; see [`load_and_validate`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load and validate: typed `[config]`, parsed rules, skipped rules kept
/// aside with their reasons.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Load the config at `path`, or write [`DEFAULT_SCAFFOLD`] there if the
/// file does not exist.
pub fn load_or_scaffold(path: impl AsRef<Path>) -> Result<LoadOutcome> {
    let path = path.as_ref();
    if path.exists() {
        return load_and_validate(path).map(LoadOutcome::Loaded);
    }

    error!(path = ?path, "no config file found; writing a default one");
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, DEFAULT_SCAFFOLD)?;
    info!(path = ?path, "default config written");
    Ok(LoadOutcome::Scaffolded(path.to_path_buf()))
}

/// `Autodeploy.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Autodeploy.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn scaffold_is_written_once_and_then_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf").join("Autodeploy.toml");

        let first = load_or_scaffold(&path).unwrap();
        assert!(matches!(first, LoadOutcome::Scaffolded(ref p) if p == &path));
        assert_eq!(fs::read_to_string(&path).unwrap(), DEFAULT_SCAFFOLD);

        match load_or_scaffold(&path).unwrap() {
            LoadOutcome::Loaded(cfg) => {
                let names: Vec<_> = cfg.rules.iter().map(|r| r.name.as_str()).collect();
                assert_eq!(names, vec!["arkviewer", "arkhandler"]);
                assert_eq!(cfg.rules[0].process_name, "ArkViewer.exe");
                assert!(cfg.skipped.is_empty());
            }
            other => panic!("expected Loaded, got {other:?}"),
        }
    }

    #[test]
    fn scaffold_matches_default_settings() {
        let raw: RawConfigFile = toml::from_str(DEFAULT_SCAFFOLD).unwrap();
        let cfg = ConfigFile::try_from(raw).unwrap();
        assert_eq!(cfg.settings, crate::types::DeploySettings::default());
    }
}
