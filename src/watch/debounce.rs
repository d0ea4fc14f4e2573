// src/watch/debounce.rs

use std::collections::HashMap;
use std::ffi::OsString;
use std::time::{Duration, Instant};

use super::event::EventKind;

/// Debounce key: file name plus event kind.
pub type DebounceKey = (OsString, EventKind);

/// Drops repeats of the same `(file name, kind)` seen within `window`.
///
/// Only accepted events refresh the timestamp, so a steady stream of
/// notifications spaced closer than the window yields one signal per
/// window rather than none at all. Entries are overwritten, never evicted:
/// the key space is a handful of names per rule.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last_seen: HashMap<DebounceKey, Instant>,
}

/// What [`Debouncer::check`] decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Debounced {
    Accept,
    /// Duplicate; carries the time since the last accepted event.
    Duplicate(Duration),
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: HashMap::new(),
        }
    }

    pub fn check(&mut self, key: DebounceKey, now: Instant) -> Debounced {
        if let Some(last) = self.last_seen.get(&key) {
            let delta = now.saturating_duration_since(*last);
            if delta < self.window {
                return Debounced::Duplicate(delta);
            }
        }
        self.last_seen.insert(key, now);
        Debounced::Accept
    }

    pub fn tracked_keys(&self) -> usize {
        self.last_seen.len()
    }
}
