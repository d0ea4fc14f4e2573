// tests/config_loading.rs

mod common;
use crate::common::builders::ConfigTextBuilder;

use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::{NamedTempFile, tempdir};

use autodeploy::config::{LoadOutcome, load_and_validate, load_or_scaffold};
use autodeploy::errors::DeployError;
use autodeploy::types::DeploySettings;

type TestResult = Result<(), Box<dyn Error>>;

fn write_config(text: &str) -> std::io::Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(text.as_bytes())?;
    Ok(file)
}

#[test]
fn rules_keep_file_order_and_strip_quotes() -> TestResult {
    let text = ConfigTextBuilder::new()
        .rule("viewer", &["ArkViewer.exe", "C:/build/ArkViewer.exe", "C:/Ark/ArkViewer.exe"])
        .raw_rule("handler", r#"  ArkHandler.exe ,  build/handler.exe,deploy/handler.exe  "#)
        .rule("exporter", &["Exporter.exe", "b/e.exe", "d/e.exe", "Helper.exe"])
        .build();
    let file = write_config(&text)?;

    let cfg = load_and_validate(file.path())?;

    let names: Vec<_> = cfg.rules.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["viewer", "handler", "exporter"]);
    assert_eq!(cfg.rules[0].process_name, "ArkViewer.exe");
    assert_eq!(cfg.rules[1].source_path, PathBuf::from("build/handler.exe"));
    assert_eq!(cfg.rules[1].target_path, PathBuf::from("deploy/handler.exe"));
    assert_eq!(cfg.rules[2].companion_process.as_deref(), Some("Helper.exe"));
    assert!(cfg.skipped.is_empty());
    assert_eq!(cfg.settings, DeploySettings::default());
    Ok(())
}

#[test]
fn wrong_arity_skips_only_that_rule() -> TestResult {
    let text = ConfigTextBuilder::new()
        .rule("short", &["A.exe", "only-source"])
        .rule("good", &["B.exe", "s/b.exe", "t/b.exe"])
        .rule("long", &["C.exe", "s", "t", "companion", "extra"])
        .build();
    let file = write_config(&text)?;

    let cfg = load_and_validate(file.path())?;

    assert_eq!(cfg.rules.len(), 1);
    assert_eq!(cfg.rules[0].name, "good");
    let skipped: Vec<_> = cfg.skipped.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(skipped, vec!["short", "long"]);
    Ok(())
}

#[test]
fn config_section_overrides_defaults() -> TestResult {
    let text = ConfigTextBuilder::new()
        .config("debounce", "\"750ms\"")
        .config("settle_delay", "\"2s\"")
        .config("remove_attempts", "3")
        .config("never_restart", "[\"arkwipe\", \"installer\"]")
        .rule("viewer", &["V.exe", "s/v.exe", "t/v.exe"])
        .build();
    let file = write_config(&text)?;

    let cfg = load_and_validate(file.path())?;

    assert_eq!(cfg.settings.debounce, Duration::from_millis(750));
    assert_eq!(cfg.settings.settle_delay, Duration::from_secs(2));
    assert_eq!(cfg.settings.remove_retry.max_attempts, 3);
    assert_eq!(cfg.settings.remove_retry.backoff, Duration::from_secs(3));
    assert_eq!(cfg.settings.lock_wait_timeout, Duration::from_secs(60));
    assert_eq!(cfg.settings.never_restart, vec!["arkwipe", "installer"]);
    Ok(())
}

#[test]
fn zero_attempts_fail_the_whole_file() -> TestResult {
    let text = ConfigTextBuilder::new()
        .config("kill_attempts", "0")
        .rule("viewer", &["V.exe", "s/v.exe", "t/v.exe"])
        .build();
    let file = write_config(&text)?;

    match load_and_validate(file.path()) {
        Err(DeployError::ConfigError(msg)) => assert!(msg.contains("kill_attempts")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
    Ok(())
}

#[test]
fn malformed_duration_is_a_config_error() -> TestResult {
    let text = ConfigTextBuilder::new().config("debounce", "\"soon\"").build();
    let file = write_config(&text)?;

    assert!(matches!(load_and_validate(file.path()), Err(DeployError::ConfigError(_))));
    Ok(())
}

#[test]
fn invalid_toml_is_reported() -> TestResult {
    let file = write_config("[settings\nviewer = ")?;

    assert!(matches!(load_and_validate(file.path()), Err(DeployError::TomlError(_))));
    Ok(())
}

#[test]
fn missing_file_is_scaffolded_then_loads_placeholders() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("Autodeploy.toml");

    let first = load_or_scaffold(&path)?;
    assert!(matches!(first, LoadOutcome::Scaffolded(_)));
    assert!(fs::read_to_string(&path)?.contains("[settings]"));

    match load_or_scaffold(&path)? {
        LoadOutcome::Loaded(cfg) => {
            assert_eq!(cfg.rules.len(), 2);
            assert_eq!(cfg.settings, DeploySettings::default());
        }
        LoadOutcome::Scaffolded(_) => panic!("scaffold written twice"),
    }
    Ok(())
}
