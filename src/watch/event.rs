// src/watch/event.rs

//! Filesystem notifications reduced to what the deployer cares about.

use std::ffi::OsStr;
use std::fmt;
use std::path::PathBuf;

use notify::event::{EventKind as NotifyKind, ModifyKind, RenameMode};

/// Kind of a raw notification. Part of the debounce key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Created,
    Modified,
    Moved,
    Deleted,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Modified => "modified",
            EventKind::Moved => "moved",
            EventKind::Deleted => "deleted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One notification for one path. Moves carry their destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub path: PathBuf,
    pub dest_path: Option<PathBuf>,
}

impl WatchEvent {
    pub fn new(kind: EventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            dest_path: None,
        }
    }

    pub fn moved(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            kind: EventKind::Moved,
            path: from.into(),
            dest_path: Some(to.into()),
        }
    }

    /// Destination for moves, the path itself otherwise.
    pub fn effective_path(&self) -> &std::path::Path {
        self.dest_path.as_deref().unwrap_or(&self.path)
    }

    pub fn file_name(&self) -> Option<&OsStr> {
        self.effective_path().file_name()
    }

    /// Split a `notify` event into per-path events.
    ///
    /// Access and unclassified events produce nothing. A rename reported
    /// with both ends becomes one `Moved` event; a rename seen only from
    /// one side becomes `Deleted` (source side) or `Created` (destination
    /// side).
    pub fn from_notify(event: &notify::Event) -> Vec<WatchEvent> {
        let per_path = |kind: EventKind| -> Vec<WatchEvent> {
            event
                .paths
                .iter()
                .map(|p| WatchEvent::new(kind, p.clone()))
                .collect()
        };

        match &event.kind {
            NotifyKind::Create(_) => per_path(EventKind::Created),
            NotifyKind::Remove(_) => per_path(EventKind::Deleted),
            NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
                [from, to] => vec![WatchEvent::moved(from.clone(), to.clone())],
                _ => per_path(EventKind::Modified),
            },
            NotifyKind::Modify(ModifyKind::Name(RenameMode::From)) => per_path(EventKind::Deleted),
            NotifyKind::Modify(ModifyKind::Name(RenameMode::To)) => per_path(EventKind::Created),
            NotifyKind::Modify(_) => per_path(EventKind::Modified),
            NotifyKind::Access(_) | NotifyKind::Any | NotifyKind::Other => Vec::new(),
        }
    }
}
