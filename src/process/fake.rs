// src/process/fake.rs

//! In-memory stand-ins for the process layer, used by the test suites.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ProcessController, ProcessEntry, ProcessTable};
use crate::errors::{DeployError, Result};

#[derive(Debug, Default)]
struct TableState {
    next_pid: u32,
    live: Vec<ProcessEntry>,
    terminated: Vec<u32>,
    snapshot_failures: u32,
    terminate_failures: u32,
}

/// Process table with scripted failures. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeProcessTable {
    state: Arc<Mutex<TableState>>,
}

fn consume(counter: &mut u32) -> bool {
    match *counter {
        0 => false,
        u32::MAX => true,
        _ => {
            *counter -= 1;
            true
        }
    }
}

impl FakeProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a live process and return its pid.
    pub fn spawn(&self, name: &str) -> u32 {
        let mut state = self.state();
        state.next_pid += 1;
        let pid = state.next_pid;
        state.live.push(ProcessEntry {
            pid,
            name: name.to_string(),
            cwd: None,
        });
        pid
    }

    pub fn is_alive(&self, pid: u32) -> bool {
        self.state().live.iter().any(|p| p.pid == pid)
    }

    /// Pids terminated so far, in order.
    pub fn terminated(&self) -> Vec<u32> {
        self.state().terminated.clone()
    }

    /// Fail the next `n` snapshots (`u32::MAX`: forever).
    pub fn fail_snapshots(&self, n: u32) {
        self.state().snapshot_failures = n;
    }

    /// Fail the next `n` terminate calls (`u32::MAX`: forever).
    pub fn fail_terminations(&self, n: u32) {
        self.state().terminate_failures = n;
    }
}

impl ProcessTable for FakeProcessTable {
    fn snapshot(&self) -> Result<Vec<ProcessEntry>> {
        let mut state = self.state();
        if consume(&mut state.snapshot_failures) {
            return Err(DeployError::ProcessControlError(
                "process list temporarily unavailable".to_string(),
            ));
        }
        Ok(state.live.clone())
    }

    fn terminate(&self, pid: u32) -> Result<bool> {
        let mut state = self.state();
        if consume(&mut state.terminate_failures) {
            return Err(DeployError::ProcessControlError(format!(
                "access denied terminating pid {pid}"
            )));
        }
        let before = state.live.len();
        state.live.retain(|p| p.pid != pid);
        if state.live.len() < before {
            state.terminated.push(pid);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Call made on a [`RecordingProcessController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessCall {
    IsRunning(String),
    Kill(String),
    Start(PathBuf),
}

#[derive(Debug, Default)]
struct ControllerState {
    running: HashSet<String>,
    calls: Vec<ProcessCall>,
    /// Processes that survive `kill` (it still reports success).
    stubborn: HashSet<String>,
}

/// Controller that records every call and keeps a set of "running" names.
///
/// `kill` stops a running name and reports true; `start` marks the
/// executable's file name as running.
#[derive(Debug, Clone, Default)]
pub struct RecordingProcessController {
    state: Arc<Mutex<ControllerState>>,
}

impl RecordingProcessController {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_running(self, name: &str) -> Self {
        self.state().running.insert(name.to_lowercase());
        self
    }

    /// Make `name` survive kills.
    pub fn stubborn(self, name: &str) -> Self {
        self.state().stubborn.insert(name.to_lowercase());
        self
    }

    pub fn calls(&self) -> Vec<ProcessCall> {
        self.state().calls.clone()
    }

    pub fn kills(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ProcessCall::Kill(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn starts(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ProcessCall::Start(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn running(&self, name: &str) -> bool {
        self.state().running.contains(&name.to_lowercase())
    }
}

impl ProcessController for RecordingProcessController {
    fn is_running(&self, name: &str) -> bool {
        let mut state = self.state();
        state.calls.push(ProcessCall::IsRunning(name.to_string()));
        state.running.contains(&name.to_lowercase())
    }

    fn kill(&self, name: &str) -> bool {
        let mut state = self.state();
        state.calls.push(ProcessCall::Kill(name.to_string()));
        let key = name.to_lowercase();
        if state.stubborn.contains(&key) {
            return state.running.contains(&key);
        }
        state.running.remove(&key)
    }

    fn start(&self, executable: &Path) -> Result<()> {
        let mut state = self.state();
        state.calls.push(ProcessCall::Start(executable.to_path_buf()));
        if let Some(name) = executable.file_name() {
            state.running.insert(name.to_string_lossy().to_lowercase());
        }
        Ok(())
    }
}
