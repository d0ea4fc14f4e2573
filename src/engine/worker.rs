// src/engine/worker.rs

use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::ShutdownFlag;
use crate::deploy::{DeployOutcome, Handled, RuleHandler};
use crate::watch::WatchEvent;

/// Counters a worker reports when it exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub dir: PathBuf,
    pub deployed: usize,
    pub up_to_date: usize,
    pub failed: usize,
    /// Events received after shutdown was requested.
    pub discarded: usize,
}

impl WorkerReport {
    fn record(&mut self, rule: &str, result: crate::errors::Result<DeployOutcome>) {
        match result {
            Ok(DeployOutcome::UpToDate) => self.up_to_date += 1,
            Ok(outcome @ DeployOutcome::Deployed { .. }) => {
                info!(rule, %outcome, "deploy finished");
                self.deployed += 1;
            }
            Err(e) => {
                error!(rule, dir = ?self.dir, error = %e, "deploy aborted");
                self.failed += 1;
            }
        }
    }
}

/// Owns the rules of one watched directory and processes its events
/// sequentially, in arrival order.
#[derive(Debug)]
pub struct DirectoryWorker {
    dir: PathBuf,
    handlers: Vec<RuleHandler>,
    rx: mpsc::Receiver<WatchEvent>,
    shutdown: ShutdownFlag,
    swept: mpsc::UnboundedSender<PathBuf>,
}

impl DirectoryWorker {
    pub fn new(
        dir: PathBuf,
        handlers: Vec<RuleHandler>,
        rx: mpsc::Receiver<WatchEvent>,
        shutdown: ShutdownFlag,
        swept: mpsc::UnboundedSender<PathBuf>,
    ) -> Self {
        Self {
            dir,
            handlers,
            rx,
            shutdown,
            swept,
        }
    }

    /// Run the startup sweep, then handle events until the channel closes.
    /// Once shutdown is requested, remaining events are drained unhandled.
    /// Blocks the calling thread.
    pub fn run(mut self) -> WorkerReport {
        let mut report = WorkerReport {
            dir: self.dir.clone(),
            ..WorkerReport::default()
        };
        debug!(dir = ?self.dir, rules = self.handlers.len(), "worker started");

        for handler in &mut self.handlers {
            if self.shutdown.is_requested() {
                break;
            }
            let rule = handler.deployer().rule().name.clone();
            report.record(&rule, handler.deploy_now());
        }
        let _ = self.swept.send(self.dir.clone());

        while let Some(event) = self.rx.blocking_recv() {
            if self.shutdown.is_requested() {
                debug!(kind = %event.kind, path = ?event.effective_path(), "discarding queued event");
                report.discarded += 1;
                continue;
            }
            self.dispatch(&event, &mut report);
        }

        debug!(dir = ?self.dir, ?report, "worker stopped");
        report
    }

    fn dispatch(&mut self, event: &WatchEvent, report: &mut WorkerReport) {
        for handler in &mut self.handlers {
            let rule = handler.deployer().rule().name.clone();
            match handler.handle(event) {
                Ok(Handled::NotMine) | Ok(Handled::Duplicate) => {}
                Ok(Handled::Deployed(outcome)) => report.record(&rule, Ok(outcome)),
                Err(e) => report.record(&rule, Err(e)),
            }
        }
    }
}
