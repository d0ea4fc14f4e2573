// src/engine/runtime.rs

use std::fmt;
use std::path::PathBuf;

use anyhow::{Result, bail};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::deploy::{AtomicDeployer, DeployContext, RuleHandler};
use crate::registry::WatchRuleRegistry;
use crate::watch::{DirectoryRoutes, WatcherHandle, spawn_watcher};

use super::worker::{DirectoryWorker, WorkerReport};
use super::{EVENT_CHANNEL_CAPACITY, ShutdownFlag};

/// Where worker events come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    /// A `notify` watcher over every source directory.
    Notify,
    /// No events at all: workers run the startup sweep and exit (`--once`).
    Closed,
    /// The caller feeds events through [`Engine::routes`].
    Manual,
}

/// Running set of directory workers plus whatever feeds them.
pub struct Engine {
    workers: Vec<JoinHandle<WorkerReport>>,
    shutdown: ShutdownFlag,
    watcher: Option<WatcherHandle>,
    routes: Option<DirectoryRoutes>,
    swept_rx: mpsc::UnboundedReceiver<PathBuf>,
    pending_sweeps: usize,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("workers", &self.workers.len())
            .field("shutdown", &self.shutdown.is_requested())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Spawn one worker per source directory of `registry`.
    ///
    /// Every worker first deploys each of its rules once (the startup
    /// sweep), then waits for events from `source`. The watcher is set up
    /// before any worker starts, so a watch failure leaves nothing running.
    pub fn start(
        registry: &WatchRuleRegistry,
        ctx: &DeployContext,
        source: EventSource,
    ) -> Result<Self> {
        let mut routes = DirectoryRoutes::new();
        let mut inboxes = Vec::new();
        for (dir, rules) in registry.by_directory() {
            let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            let files: Vec<_> = rules
                .iter()
                .filter_map(|rule| rule.source_file_name())
                .map(|name| name.to_os_string())
                .collect();
            if !routes.insert(dir.clone(), files, tx) {
                bail!("source directory {dir:?} was grouped twice");
            }
            inboxes.push((dir, rules, rx));
        }

        let mut watcher = None;
        let mut manual_routes = None;
        match source {
            EventSource::Notify => watcher = Some(spawn_watcher(routes)?),
            EventSource::Closed => drop(routes),
            EventSource::Manual => manual_routes = Some(routes),
        }

        let shutdown = ShutdownFlag::new();
        let (swept_tx, swept_rx) = mpsc::unbounded_channel();
        let mut workers = Vec::with_capacity(inboxes.len());
        for (dir, rules, rx) in inboxes {
            let ctx = ctx.clone();
            let flag = shutdown.clone();
            let swept = swept_tx.clone();
            workers.push(tokio::task::spawn_blocking(move || {
                // Deployers hash their targets on construction; keep that off
                // the async threads.
                let handlers = rules
                    .into_iter()
                    .map(|rule| RuleHandler::new(AtomicDeployer::new(rule, ctx.clone())))
                    .collect();
                DirectoryWorker::new(dir, handlers, rx, flag, swept).run()
            }));
        }
        info!(workers = workers.len(), rules = registry.len(), ?source, "engine started");

        let pending_sweeps = workers.len();
        Ok(Self {
            workers,
            shutdown,
            watcher,
            routes: manual_routes,
            swept_rx,
            pending_sweeps,
        })
    }

    /// Event inlets, for [`EventSource::Manual`].
    pub fn routes(&self) -> Option<&DirectoryRoutes> {
        self.routes.as_ref()
    }

    /// Resolve once every worker has finished its startup sweep (or
    /// exited).
    pub async fn wait_for_sweep(&mut self) {
        while self.pending_sweeps > 0 {
            match self.swept_rx.recv().await {
                Some(dir) => {
                    self.pending_sweeps -= 1;
                    debug!(?dir, "startup sweep done");
                }
                None => break,
            }
        }
    }

    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Close the event channels and wait until every queued event has been
    /// processed.
    pub async fn finish(mut self) -> Vec<WorkerReport> {
        self.watcher = None;
        self.routes = None;
        self.join().await
    }

    /// Stop watching, let in-flight deploys complete and drop queued events.
    pub async fn shutdown(mut self) -> Vec<WorkerReport> {
        info!("shutting down");
        self.watcher = None;
        self.shutdown.request();
        self.routes = None;
        self.join().await
    }

    async fn join(self) -> Vec<WorkerReport> {
        let mut reports = Vec::with_capacity(self.workers.len());
        for handle in self.workers {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => error!(error = %e, "directory worker panicked"),
            }
        }
        debug!(?reports, "all workers joined");
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fs::mock::{MockFileSystem, MockOp};
    use crate::process::fake::RecordingProcessController;
    use crate::types::{DeploySettings, WatchRule};
    use crate::watch::{EventKind, WatchEvent};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn rule(name: &str, dir: &str) -> WatchRule {
        WatchRule {
            name: name.into(),
            process_name: format!("{name}.exe"),
            source_path: PathBuf::from(format!("{dir}/{name}.exe")),
            target_path: PathBuf::from(format!("/srv/{name}.exe")),
            companion_process: None,
        }
    }

    fn ctx(fs: &MockFileSystem) -> DeployContext {
        DeployContext {
            fs: Arc::new(fs.clone()),
            processes: Arc::new(RecordingProcessController::new()),
            clock: Arc::new(ManualClock::new()),
            settings: Arc::new(DeploySettings::default()),
        }
    }

    fn copies(fs: &MockFileSystem) -> Vec<PathBuf> {
        fs.ops()
            .into_iter()
            .filter_map(|op| match op {
                MockOp::Copy { from, .. } => Some(from),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn closed_source_runs_sweep_only() {
        let fs = MockFileSystem::new();
        fs.add_file("/build/a.exe", b"new".to_vec());
        fs.add_file("/srv/a.exe", b"old".to_vec());
        fs.add_file("/other/b.exe", b"same".to_vec());
        fs.add_file("/srv/b.exe", b"same".to_vec());
        let (registry, _) =
            WatchRuleRegistry::activate([rule("a", "/build"), rule("b", "/other")], &fs);

        let engine = Engine::start(&registry, &ctx(&fs), EventSource::Closed).unwrap();
        assert_eq!(engine.worker_count(), 2);
        let reports = engine.finish().await;

        let deployed: usize = reports.iter().map(|r| r.deployed).sum();
        let up_to_date: usize = reports.iter().map(|r| r.up_to_date).sum();
        assert_eq!((deployed, up_to_date), (1, 1));
        assert_eq!(fs.contents("/srv/a.exe"), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn events_in_one_directory_are_handled_in_order() {
        let fs = MockFileSystem::new();
        for name in ["a", "b", "c"] {
            fs.add_file(format!("/build/{name}.exe"), b"v1".to_vec());
            fs.add_file(format!("/srv/{name}.exe"), b"v1".to_vec());
        }
        let (registry, _) = WatchRuleRegistry::activate(
            [rule("a", "/build"), rule("b", "/build"), rule("c", "/build")],
            &fs,
        );
        let mut engine = Engine::start(&registry, &ctx(&fs), EventSource::Manual).unwrap();
        engine.wait_for_sweep().await;

        for name in ["c", "a", "b"] {
            fs.add_file(format!("/build/{name}.exe"), b"v2".to_vec());
        }
        let routes = engine.routes().unwrap();
        for name in ["c", "a", "b"] {
            let ev = WatchEvent::new(EventKind::Modified, format!("/build/{name}.exe"));
            assert!(routes.send(ev).await);
        }
        let reports = engine.finish().await;

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].deployed, 3);
        assert_eq!(
            copies(&fs),
            vec![
                PathBuf::from("/build/c.exe"),
                PathBuf::from("/build/a.exe"),
                PathBuf::from("/build/b.exe"),
            ]
        );
    }

    #[tokio::test]
    async fn failed_watch_starts_no_workers() {
        let fs = MockFileSystem::new();
        fs.add_file("/autodeploy-no-such-dir/a.exe", b"new".to_vec());
        fs.add_file("/srv/a.exe", b"old".to_vec());
        let (registry, _) =
            WatchRuleRegistry::activate([rule("a", "/autodeploy-no-such-dir")], &fs);
        let before = fs.ops().len();

        let started = Engine::start(&registry, &ctx(&fs), EventSource::Notify);
        assert!(started.is_err());

        // A sweep would have copied and swapped by now.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(fs.ops().len(), before);
        assert_eq!(fs.contents("/srv/a.exe"), Some(b"old".to_vec()));
    }

    #[tokio::test]
    async fn shutdown_discards_queued_events() {
        let fs = MockFileSystem::new();
        fs.add_file("/build/a.exe", b"v1".to_vec());
        fs.add_file("/srv/a.exe", b"v1".to_vec());
        let (registry, _) = WatchRuleRegistry::activate([rule("a", "/build")], &fs);
        let engine = Engine::start(&registry, &ctx(&fs), EventSource::Manual).unwrap();

        // Request shutdown before anything is queued so every event is
        // seen after the flag.
        engine.shutdown_flag().request();
        fs.add_file("/build/a.exe", b"v2".to_vec());
        for _ in 0..3 {
            let ev = WatchEvent::new(EventKind::Modified, "/build/a.exe");
            engine.routes().unwrap().send(ev).await;
        }
        let reports = engine.shutdown().await;

        assert_eq!(reports[0].deployed, 0);
        assert_eq!(reports[0].discarded, 3);
        assert_eq!(fs.contents("/srv/a.exe"), Some(b"v1".to_vec()));
    }
}
