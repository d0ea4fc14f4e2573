// src/deploy/mod.rs

//! Per-rule deploy: hash gate, stop the process, swap the file, restart.
//!
//! [`AtomicDeployer`] owns one rule's state and performs the whole deploy
//! on the calling thread. [`handler::RuleHandler`] sits in front of it and
//! turns raw watch events into deploy calls.

pub mod handler;
pub mod swap;

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::process::{ProcessController, is_network_path};
use crate::types::{DeploySettings, WatchRule};
use crate::watch::hash::{Digest, hash_file, hash_if_exists};

use swap::{SwapContext, swap_into_place};

pub use handler::{Handled, RuleHandler};

/// Shared collaborators handed to every deployer.
#[derive(Debug, Clone)]
pub struct DeployContext {
    pub fs: Arc<dyn FileSystem>,
    pub processes: Arc<dyn ProcessController>,
    pub clock: Arc<dyn Clock>,
    pub settings: Arc<DeploySettings>,
}

/// What the deployer remembers between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployState {
    /// Digest of the target as of the last startup or successful deploy.
    /// `None` when the target does not exist or could not be read.
    pub last_known_target_hash: Option<Digest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Source and target already have the same content.
    UpToDate,
    Deployed { restarted: bool },
}

impl fmt::Display for DeployOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployOutcome::UpToDate => f.write_str("already up to date"),
            DeployOutcome::Deployed { restarted: true } => f.write_str("deployed and restarted"),
            DeployOutcome::Deployed { restarted: false } => f.write_str("deployed"),
        }
    }
}

/// Why a process was or was not started after a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestartDecision {
    Start,
    AlreadyRunning,
    NotExecutable,
    Excluded,
    NetworkPath,
}

/// Deploys one rule's source over its target.
#[derive(Debug)]
pub struct AtomicDeployer {
    rule: WatchRule,
    ctx: DeployContext,
    state: DeployState,
}

impl AtomicDeployer {
    /// Create a deployer and record the target's current digest.
    pub fn new(rule: WatchRule, ctx: DeployContext) -> Self {
        let last_known_target_hash = match hash_if_exists(ctx.fs.as_ref(), &rule.target_path) {
            Ok(digest) => digest,
            Err(e) => {
                warn!(rule = %rule.name, error = %e, "could not hash target at startup");
                None
            }
        };
        debug!(rule = %rule.name, target_hash = ?last_known_target_hash, "deployer ready");

        Self {
            rule,
            ctx,
            state: DeployState {
                last_known_target_hash,
            },
        }
    }

    pub fn rule(&self) -> &WatchRule {
        &self.rule
    }

    pub fn state(&self) -> &DeployState {
        &self.state
    }

    /// Bring the target in line with the source.
    ///
    /// Nothing is touched when the source digest matches the last known
    /// target digest. Otherwise the owning process is stopped, the file is
    /// swapped through a staging copy, and the process is started again when
    /// allowed. A failed swap leaves the known digest unchanged.
    pub fn deploy(&mut self) -> Result<DeployOutcome> {
        let rule = &self.rule;
        let fs = self.ctx.fs.as_ref();
        let processes = self.ctx.processes.as_ref();
        let settings = self.ctx.settings.as_ref();

        let source_digest = hash_file(fs, &rule.source_path)?;
        if self.state.last_known_target_hash == Some(source_digest) {
            info!(rule = %rule.name, digest = %source_digest, "target already up to date");
            return Ok(DeployOutcome::UpToDate);
        }
        info!(
            rule = %rule.name,
            source = ?rule.source_path,
            target = ?rule.target_path,
            "content changed; deploying"
        );

        if processes.is_running(&rule.process_name) {
            info!(rule = %rule.name, process = %rule.process_name, "stopping process before swap");
            processes.kill(&rule.process_name);
            self.ctx.clock.sleep(settings.settle_delay);
        }
        if let Some(companion) = &rule.companion_process {
            if processes.kill(companion) {
                info!(rule = %rule.name, process = %companion, "stopped companion process");
            }
        }

        let swap_ctx = SwapContext {
            fs,
            processes,
            clock: self.ctx.clock.as_ref(),
            remove_retry: settings.remove_retry,
        };
        swap_into_place(&swap_ctx, rule)?;
        info!(rule = %rule.name, target = ?rule.target_path, "target replaced");

        let restarted = match self.restart_decision() {
            RestartDecision::Start => match processes.start(&rule.target_path) {
                Ok(()) => true,
                Err(e) => {
                    warn!(rule = %rule.name, error = %e, "failed to restart process");
                    false
                }
            },
            other => {
                info!(rule = %rule.name, reason = ?other, "not restarting process");
                false
            }
        };

        self.state.last_known_target_hash = match hash_file(fs, &rule.target_path) {
            Ok(digest) => Some(digest),
            Err(e) => {
                warn!(rule = %rule.name, error = %e, "could not rehash target; using source digest");
                Some(source_digest)
            }
        };

        Ok(DeployOutcome::Deployed { restarted })
    }

    fn restart_decision(&self) -> RestartDecision {
        let rule = &self.rule;
        let target = &rule.target_path;
        if self.ctx.processes.is_running(&rule.process_name) {
            RestartDecision::AlreadyRunning
        } else if !self.ctx.fs.is_executable(target) {
            RestartDecision::NotExecutable
        } else if self.ctx.settings.is_restart_excluded(target) {
            RestartDecision::Excluded
        } else if is_network_path(target) {
            RestartDecision::NetworkPath
        } else {
            RestartDecision::Start
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::errors::DeployError;
    use crate::fs::mock::{MockFileSystem, MockOp};
    use crate::process::fake::RecordingProcessController;
    use crate::retry::RetryPolicy;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    const SOURCE: &str = "/build/app.exe";
    const TARGET: &str = "/srv/app/app.exe";
    const TEMP: &str = "/srv/app/app.tmp";

    fn rule() -> WatchRule {
        WatchRule {
            name: "app".into(),
            process_name: "app.exe".into(),
            source_path: PathBuf::from(SOURCE),
            target_path: PathBuf::from(TARGET),
            companion_process: None,
        }
    }

    struct Harness {
        fs: MockFileSystem,
        procs: RecordingProcessController,
        clock: ManualClock,
    }

    impl Harness {
        fn new(procs: RecordingProcessController) -> Self {
            Self {
                fs: MockFileSystem::new(),
                procs,
                clock: ManualClock::new(),
            }
        }

        fn deployer(&self, rule: WatchRule, settings: DeploySettings) -> AtomicDeployer {
            AtomicDeployer::new(
                rule,
                DeployContext {
                    fs: Arc::new(self.fs.clone()),
                    processes: Arc::new(self.procs.clone()),
                    clock: Arc::new(self.clock.clone()),
                    settings: Arc::new(settings),
                },
            )
        }

        fn writes(&self) -> usize {
            self.fs
                .ops()
                .iter()
                .filter(|op| matches!(op, MockOp::Copy { .. } | MockOp::Rename { .. }))
                .count()
        }
    }

    #[test]
    fn scenario_changed_binary_with_running_process() {
        let h = Harness::new(RecordingProcessController::new().with_running("app.exe"));
        h.fs.add_executable(SOURCE, b"A".to_vec());
        h.fs.add_executable(TARGET, b"B".to_vec());
        let mut deployer = h.deployer(rule(), DeploySettings::default());

        let outcome = deployer.deploy().unwrap();

        assert_eq!(outcome, DeployOutcome::Deployed { restarted: true });
        assert_eq!(h.fs.contents(TARGET), Some(b"A".to_vec()));
        assert!(!h.fs.exists(Path::new(TEMP)));
        assert_eq!(h.procs.kills(), vec!["app.exe".to_string()]);
        assert_eq!(h.procs.starts(), vec![PathBuf::from(TARGET)]);
        assert_eq!(
            deployer.state().last_known_target_hash,
            Some(Digest::of_bytes(b"A"))
        );
        // settle delay after the kill
        assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(5)]);
    }

    #[test]
    fn scenario_identical_content_touches_nothing() {
        let h = Harness::new(RecordingProcessController::new().with_running("app.exe"));
        h.fs.add_executable(SOURCE, b"same".to_vec());
        h.fs.add_executable(TARGET, b"same".to_vec());
        let mut deployer = h.deployer(rule(), DeploySettings::default());

        assert_eq!(deployer.deploy().unwrap(), DeployOutcome::UpToDate);

        assert!(h.procs.calls().is_empty());
        assert!(h.fs.ops().is_empty());
    }

    #[test]
    fn second_deploy_without_change_is_a_noop() {
        let h = Harness::new(RecordingProcessController::new());
        h.fs.add_executable(SOURCE, b"v2".to_vec());
        h.fs.add_executable(TARGET, b"v1".to_vec());
        let mut deployer = h.deployer(rule(), DeploySettings::default());

        assert!(matches!(deployer.deploy().unwrap(), DeployOutcome::Deployed { .. }));
        let ops_after_first = h.fs.ops().len();
        assert_eq!(deployer.deploy().unwrap(), DeployOutcome::UpToDate);

        assert_eq!(h.fs.ops().len(), ops_after_first);
        assert_eq!(h.writes(), 2);
    }

    #[test]
    fn changed_content_means_one_kill_and_one_write() {
        let h = Harness::new(RecordingProcessController::new().with_running("app.exe"));
        h.fs.add_file(SOURCE, b"new".to_vec());
        h.fs.add_file(TARGET, b"old".to_vec());
        let mut deployer = h.deployer(rule(), DeploySettings::default());

        deployer.deploy().unwrap();

        assert_eq!(h.procs.kills().len(), 1);
        let copies = h.fs.ops().iter().filter(|op| matches!(op, MockOp::Copy { .. })).count();
        let renames = h.fs.ops().iter().filter(|op| matches!(op, MockOp::Rename { .. })).count();
        assert_eq!((copies, renames), (1, 1));
    }

    #[test]
    fn missing_target_is_created() {
        let h = Harness::new(RecordingProcessController::new());
        h.fs.add_file(SOURCE, b"first".to_vec());
        let mut deployer = h.deployer(rule(), DeploySettings::default());
        assert_eq!(deployer.state().last_known_target_hash, None);

        let outcome = deployer.deploy().unwrap();

        assert_eq!(outcome, DeployOutcome::Deployed { restarted: false });
        assert_eq!(h.fs.contents(TARGET), Some(b"first".to_vec()));
        assert!(h.procs.kills().is_empty());
    }

    #[test]
    fn failed_rename_leaves_no_temp_and_keeps_old_hash() {
        let h = Harness::new(RecordingProcessController::new());
        h.fs.add_file(SOURCE, b"new".to_vec());
        h.fs.add_file(TARGET, b"old".to_vec());
        h.fs.fail_renames_onto(TARGET);
        let mut deployer = h.deployer(rule(), DeploySettings::default());

        let err = deployer.deploy().unwrap_err();

        assert!(matches!(err, DeployError::SwapFailure { .. }));
        assert!(!h.fs.exists(Path::new(TEMP)));
        assert_eq!(
            deployer.state().last_known_target_hash,
            Some(Digest::of_bytes(b"old"))
        );
        assert!(h.procs.starts().is_empty());
    }

    #[test]
    fn failed_copy_leaves_target_untouched() {
        let h = Harness::new(RecordingProcessController::new());
        h.fs.add_file(SOURCE, b"new content".to_vec());
        h.fs.add_file(TARGET, b"old".to_vec());
        h.fs.fail_copies_into(TEMP);
        let mut deployer = h.deployer(rule(), DeploySettings::default());

        assert!(deployer.deploy().is_err());

        assert_eq!(h.fs.contents(TARGET), Some(b"old".to_vec()));
        assert!(!h.fs.exists(Path::new(TEMP)));
        assert!(!h.fs.ops().iter().any(|op| matches!(op, MockOp::Remove(p) if p == Path::new(TARGET))));
    }

    #[test]
    fn lock_retries_are_bounded() {
        let h = Harness::new(RecordingProcessController::new().stubborn("app.exe").with_running("app.exe"));
        h.fs.add_file(SOURCE, b"new".to_vec());
        h.fs.add_file(TARGET, b"old".to_vec());
        h.fs.lock_removes(TARGET, u32::MAX);
        let settings = DeploySettings {
            remove_retry: RetryPolicy::new(4, Duration::from_secs(3)),
            ..DeploySettings::default()
        };
        let mut deployer = h.deployer(rule(), settings);

        let err = deployer.deploy().unwrap_err();

        match err {
            DeployError::LockContention { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("expected LockContention, got {other:?}"),
        }
        assert_eq!(h.fs.contents(TARGET), Some(b"old".to_vec()));
        assert!(!h.fs.exists(Path::new(TEMP)));
        // initial kill plus one between each of the 4 attempts
        assert_eq!(h.procs.kills().len(), 1 + 3);
        let removes = h
            .fs
            .ops()
            .iter()
            .filter(|op| matches!(op, MockOp::Remove(p) if p == Path::new(TARGET)))
            .count();
        assert_eq!(removes, 4);
    }

    #[test]
    fn transient_lock_is_outlasted() {
        let h = Harness::new(RecordingProcessController::new());
        h.fs.add_file(SOURCE, b"new".to_vec());
        h.fs.add_file(TARGET, b"old".to_vec());
        h.fs.lock_removes(TARGET, 2);
        let mut deployer = h.deployer(rule(), DeploySettings::default());

        assert!(deployer.deploy().is_ok());

        assert_eq!(h.fs.contents(TARGET), Some(b"new".to_vec()));
        assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(3); 2]);
    }

    #[test]
    fn companion_is_stopped_too() {
        let h = Harness::new(
            RecordingProcessController::new()
                .with_running("app.exe")
                .with_running("exporter.exe"),
        );
        h.fs.add_file(SOURCE, b"new".to_vec());
        h.fs.add_file(TARGET, b"old".to_vec());
        let rule = WatchRule {
            companion_process: Some("exporter.exe".into()),
            ..rule()
        };
        let mut deployer = h.deployer(rule, DeploySettings::default());

        deployer.deploy().unwrap();

        assert_eq!(h.procs.kills(), vec!["app.exe".to_string(), "exporter.exe".to_string()]);
        assert!(!h.procs.running("exporter.exe"));
    }

    #[test]
    fn excluded_targets_are_not_restarted() {
        let h = Harness::new(RecordingProcessController::new().with_running("arkwipe.exe"));
        let rule = WatchRule {
            process_name: "arkwipe.exe".into(),
            source_path: PathBuf::from("/build/arkwipe.exe"),
            target_path: PathBuf::from("/srv/tools/ArkWipe.exe"),
            ..rule()
        };
        h.fs.add_executable(&rule.source_path, b"new".to_vec());
        h.fs.add_executable(&rule.target_path, b"old".to_vec());
        let settings = DeploySettings {
            never_restart: vec!["arkwipe".into()],
            ..DeploySettings::default()
        };
        let mut deployer = h.deployer(rule, settings);

        assert_eq!(deployer.deploy().unwrap(), DeployOutcome::Deployed { restarted: false });
        assert!(h.procs.starts().is_empty());
    }

    #[test]
    fn non_executable_targets_are_not_started() {
        let h = Harness::new(RecordingProcessController::new().with_running("app.exe"));
        h.fs.add_file(SOURCE, b"new".to_vec());
        h.fs.add_file(TARGET, b"old".to_vec());
        let mut deployer = h.deployer(rule(), DeploySettings::default());

        assert_eq!(deployer.deploy().unwrap(), DeployOutcome::Deployed { restarted: false });
        assert!(h.procs.starts().is_empty());
    }

    #[test]
    fn unreadable_source_is_a_hash_error() {
        let h = Harness::new(RecordingProcessController::new());
        h.fs.add_file(TARGET, b"old".to_vec());
        let mut deployer = h.deployer(rule(), DeploySettings::default());

        assert!(matches!(deployer.deploy(), Err(DeployError::HashError { .. })));
        assert!(h.fs.ops().is_empty());
    }
}
