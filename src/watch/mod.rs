// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Converting `notify` events into [`WatchEvent`]s and routing them to the
//!   worker of the directory they happened in.
//! - Collapsing notification bursts ([`debounce`]).
//! - Waiting for a writer to release a changed file ([`lock_wait`]).
//! - Content hashing, so unchanged files are never redeployed ([`hash`]).
//!
//! It does **not** know about processes or swaps; it only turns filesystem
//! changes into per-rule signals.

pub mod debounce;
pub mod event;
pub mod hash;
pub mod lock_wait;
pub mod watcher;

pub use debounce::{DebounceKey, Debounced, Debouncer};
pub use event::{EventKind, WatchEvent};
pub use hash::{Digest, hash_file, hash_if_exists};
pub use lock_wait::wait_until_unlocked;
pub use watcher::{DirectoryRoutes, WatcherHandle, spawn_watcher};
