// src/watch/watcher.rs

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, trace, warn};

use super::event::WatchEvent;

/// Handle for the filesystem watcher.
///
/// Keeps the underlying `RecommendedWatcher` alive. Dropping it stops
/// watching and releases the senders, which closes the per-directory
/// channels once nothing else holds them.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// One worker inlet: its channel plus the file names its rules watch.
#[derive(Debug, Clone)]
struct Route {
    tx: mpsc::Sender<WatchEvent>,
    files: HashSet<OsString>,
}

impl Route {
    fn watches(&self, path: &Path) -> bool {
        path.file_name().is_some_and(|name| self.files.contains(name))
    }

    /// Enqueue without waiting. A full queue drops the event: the worker
    /// already has older events for the same files pending, and each
    /// deploy reads the source as it is when handled.
    fn offer(&self, event: WatchEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(path = ?event.effective_path(), kind = %event.kind, "worker queue full; dropping event");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Maps watched directories to their worker channels.
///
/// Directories are stored both as given and canonicalized, since `notify`
/// reports absolute paths while rules may use relative ones. Events for
/// files no rule in the directory watches are not forwarded.
#[derive(Debug, Clone, Default)]
pub struct DirectoryRoutes {
    dirs: Vec<PathBuf>,
    routes: HashMap<PathBuf, Route>,
}

impl DirectoryRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route events for `files` in `dir` to `tx`.
    ///
    /// Returns false, leaving the existing route untouched, when `dir` is
    /// already routed under any spelling.
    pub fn insert<I>(&mut self, dir: impl Into<PathBuf>, files: I, tx: mpsc::Sender<WatchEvent>) -> bool
    where
        I: IntoIterator,
        I::Item: Into<OsString>,
    {
        let dir = dir.into();
        let mut keys = vec![dir.clone()];
        if let Ok(canonical) = dir.canonicalize() {
            if canonical != dir {
                keys.push(canonical);
            }
        }
        if let Some(taken) = keys.iter().find(|key| self.routes.contains_key(*key)) {
            warn!(?dir, existing = ?taken, "directory is already routed; keeping the first worker");
            return false;
        }

        let route = Route {
            tx,
            files: files.into_iter().map(Into::into).collect(),
        };
        for key in keys {
            self.routes.insert(key, route.clone());
        }
        self.dirs.push(dir);
        true
    }

    /// Directories in insertion order.
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    fn route_for(&self, path: &Path) -> Option<&Route> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        self.routes.get(parent).or_else(|| {
            parent
                .canonicalize()
                .ok()
                .and_then(|canonical| self.routes.get(&canonical))
        })
    }

    /// Send `event` to the worker of the directory it happened in, if a
    /// rule there watches the file. A move is offered to the directory it
    /// left and the one it entered, once per worker.
    ///
    /// Never blocks. Returns false if nothing accepted the event.
    pub fn route(&self, event: WatchEvent) -> bool {
        let mut paths = vec![event.path.clone()];
        if let Some(dest) = &event.dest_path {
            paths.push(dest.clone());
        }

        let mut delivered = false;
        let mut offered: Vec<&mpsc::Sender<WatchEvent>> = Vec::new();
        for path in &paths {
            let Some(route) = self.route_for(path) else {
                continue;
            };
            if !route.watches(path) || offered.iter().any(|tx| tx.same_channel(&route.tx)) {
                continue;
            }
            offered.push(&route.tx);
            delivered |= route.offer(event.clone());
        }
        delivered
    }

    /// Async counterpart of [`route`](Self::route) for callers already on
    /// the runtime. Only the destination directory is notified, and the
    /// call waits for queue space.
    pub async fn send(&self, event: WatchEvent) -> bool {
        let path = event.effective_path();
        match self.route_for(path) {
            Some(route) if route.watches(path) => route.tx.send(event).await.is_ok(),
            _ => false,
        }
    }
}

/// Watch every routed directory (non-recursively) and forward converted
/// events to the matching worker channel.
///
/// The `notify` callback thread is shared by every directory, so routing
/// never waits on a busy worker.
pub fn spawn_watcher(routes: DirectoryRoutes) -> Result<WatcherHandle> {
    let dirs = routes.dirs().to_vec();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                trace!(?event, "received notify event");
                for ev in WatchEvent::from_notify(&event) {
                    if !routes.route(ev.clone()) {
                        trace!(path = ?ev.effective_path(), "event for unwatched path or closed worker");
                    }
                }
            }
            Err(err) => warn!(error = %err, "file watch error"),
        },
        Config::default(),
    )
    .context("failed to create file watcher")?;

    for dir in &dirs {
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch directory {dir:?}"))?;
        info!(?dir, "watching directory");
    }
    debug!(count = dirs.len(), "file watcher started");

    Ok(WatcherHandle { _inner: watcher })
}
