// src/engine/mod.rs

//! Orchestration engine for autodeploy.
//!
//! This module ties together:
//! - one [`worker::DirectoryWorker`] per watched directory, each on the
//!   blocking pool and owning the rules of that directory
//! - the per-directory event channels, fed by the `notify` watcher (or by
//!   the caller, in tests)
//! - shutdown: stop the watcher, let in-flight deploys finish, drop what is
//!   still queued, join every worker
//!
//! The async shell lives in [`runtime`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub mod runtime;
pub mod worker;

pub use runtime::{Engine, EventSource};
pub use worker::{DirectoryWorker, WorkerReport};

/// Capacity of each directory's event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Set once on shutdown; read by workers between events.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
