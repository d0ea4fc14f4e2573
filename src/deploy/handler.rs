// src/deploy/handler.rs

use tracing::{debug, warn};

use super::{AtomicDeployer, DeployOutcome};
use crate::errors::{DeployError, Result};
use crate::watch::debounce::{Debounced, Debouncer};
use crate::watch::event::{EventKind, WatchEvent};
use crate::watch::lock_wait::wait_until_unlocked;

/// What a [`RuleHandler`] did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// The event concerns another file.
    NotMine,
    /// Dropped by the debounce window.
    Duplicate,
    Deployed(DeployOutcome),
}

/// Turns watch events for one rule into deploys.
///
/// Each event goes through the same gates in order: file name filter,
/// debounce, deletion check, lock wait, deploy.
#[derive(Debug)]
pub struct RuleHandler {
    deployer: AtomicDeployer,
    debouncer: Debouncer,
}

impl RuleHandler {
    pub fn new(deployer: AtomicDeployer) -> Self {
        let window = deployer.ctx.settings.debounce;
        Self {
            deployer,
            debouncer: Debouncer::new(window),
        }
    }

    pub fn deployer(&self) -> &AtomicDeployer {
        &self.deployer
    }

    /// Deploy without an event, as the startup sweep does.
    pub fn deploy_now(&mut self) -> Result<DeployOutcome> {
        self.deployer.deploy()
    }

    pub fn handle(&mut self, event: &WatchEvent) -> Result<Handled> {
        let rule = self.deployer.rule();
        let Some(watched) = rule.source_file_name() else {
            return Ok(Handled::NotMine);
        };
        let Some(name) = event.file_name() else {
            return Ok(Handled::NotMine);
        };
        if name != watched {
            // The source being renamed away is a deletion as far as we care.
            let moved_away = event.kind == EventKind::Moved && event.path.file_name() == Some(watched);
            if !moved_away {
                return Ok(Handled::NotMine);
            }
            return Err(self.source_gone(event));
        }

        let ctx = &self.deployer.ctx;
        let key = (name.to_os_string(), event.kind);
        if let Debounced::Duplicate(delta) = self.debouncer.check(key, ctx.clock.now()) {
            debug!(
                rule = %rule.name,
                kind = %event.kind,
                since_ms = delta.as_millis() as u64,
                "duplicate event ignored"
            );
            return Ok(Handled::Duplicate);
        }

        if event.kind == EventKind::Deleted {
            return Err(self.source_gone(event));
        }

        debug!(rule = %rule.name, kind = %event.kind, path = ?event.effective_path(), "change detected");
        wait_until_unlocked(
            ctx.fs.as_ref(),
            ctx.clock.as_ref(),
            &rule.source_path,
            ctx.settings.lock_wait_timeout,
            ctx.settings.lock_poll,
        )?;

        self.deployer.deploy().map(Handled::Deployed)
    }

    fn source_gone(&self, event: &WatchEvent) -> DeployError {
        let rule = self.deployer.rule();
        warn!(rule = %rule.name, path = ?event.path, kind = %event.kind, "watched source went away");
        DeployError::SourceUnavailable {
            path: rule.source_path.clone(),
            reason: format!("source {}", event.kind),
        }
    }
}
