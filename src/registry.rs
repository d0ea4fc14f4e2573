// src/registry.rs

//! The set of active watch rules, grouped by the directory they watch.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{error, info};

use crate::config::SkippedRule;
use crate::fs::FileSystem;
use crate::types::WatchRule;

/// Rules that passed activation, in config order.
#[derive(Debug, Clone, Default)]
pub struct WatchRuleRegistry {
    rules: Vec<WatchRule>,
}

impl WatchRuleRegistry {
    /// Check each rule against the filesystem and keep the usable ones.
    ///
    /// A rule is rejected when its source is missing or not a regular file,
    /// or when its target exists but is not a regular file. The target's
    /// parent directory is created if absent. Rejections are logged and
    /// returned; they never stop other rules from activating.
    pub fn activate(
        rules: impl IntoIterator<Item = WatchRule>,
        fs: &dyn FileSystem,
    ) -> (Self, Vec<SkippedRule>) {
        let mut active = Vec::new();
        let mut skipped = Vec::new();

        for rule in rules {
            match check_rule(&rule, fs) {
                Ok(()) => {
                    info!(
                        rule = %rule.name,
                        source = ?rule.source_path,
                        target = ?rule.target_path,
                        "watching source for changes"
                    );
                    active.push(rule);
                }
                Err(reason) => {
                    error!(rule = %rule.name, %reason, "skipping rule");
                    skipped.push(SkippedRule {
                        name: rule.name.clone(),
                        reason,
                    });
                }
            }
        }

        (Self { rules: active }, skipped)
    }

    pub fn rules(&self) -> &[WatchRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules grouped by source directory. Directories appear in the order
    /// of their first rule; rules keep config order within a directory.
    ///
    /// Keys are canonical, so one directory spelled two ways (relative and
    /// absolute, through `..` or a symlink) still gets a single group.
    pub fn by_directory(&self) -> IndexMap<PathBuf, Vec<WatchRule>> {
        let mut groups: IndexMap<PathBuf, Vec<WatchRule>> = IndexMap::new();
        for rule in &self.rules {
            groups
                .entry(directory_key(&rule.source_dir()))
                .or_default()
                .push(rule.clone());
        }
        groups
    }
}

/// Canonical form of `dir`, or its absolute form when it cannot be resolved.
fn directory_key(dir: &Path) -> PathBuf {
    dir.canonicalize()
        .or_else(|_| std::path::absolute(dir))
        .unwrap_or_else(|_| dir.to_path_buf())
}

fn check_rule(rule: &WatchRule, fs: &dyn FileSystem) -> Result<(), String> {
    if rule.source_file_name().is_none() {
        return Err(format!("source {:?} has no file name", rule.source_path));
    }
    if !fs.exists(&rule.source_path) {
        return Err(format!("source file {:?} not found", rule.source_path));
    }
    if !fs.is_file(&rule.source_path) {
        return Err(format!("source {:?} is not a file", rule.source_path));
    }
    if rule.target_path.file_name().is_none() {
        return Err(format!("target {:?} has no file name", rule.target_path));
    }
    if fs.exists(&rule.target_path) && !fs.is_file(&rule.target_path) {
        return Err(format!("target {:?} is not a file", rule.target_path));
    }
    if let Some(parent) = rule.target_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs.create_dir_all(parent)
                .map_err(|e| format!("cannot create target directory {parent:?}: {e}"))?;
        }
    }
    Ok(())
}
