// src/process/system.rs

use std::sync::{Mutex, MutexGuard};

use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::trace;

use super::{ProcessEntry, ProcessTable};
use crate::errors::{DeployError, Result};

/// [`ProcessTable`] backed by `sysinfo`.
///
/// The `System` is refreshed on every snapshot and reused for
/// termination, so `terminate` acts on the pids the last snapshot saw.
#[derive(Debug)]
pub struct SysinfoTable {
    system: Mutex<System>,
}

impl SysinfoTable {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn system(&self) -> MutexGuard<'_, System> {
        self.system.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SysinfoTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoTable {
    fn snapshot(&self) -> Result<Vec<ProcessEntry>> {
        let mut system = self.system();
        let refreshed = system.refresh_processes(ProcessesToUpdate::All, true);
        if refreshed == 0 || system.processes().is_empty() {
            return Err(DeployError::ProcessControlError(
                "process enumeration returned no processes".to_string(),
            ));
        }

        let entries: Vec<ProcessEntry> = system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessEntry {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().into_owned(),
                cwd: process.cwd().map(|p| p.to_path_buf()),
            })
            .collect();
        trace!(count = entries.len(), "enumerated processes");
        Ok(entries)
    }

    fn terminate(&self, pid: u32) -> Result<bool> {
        let system = self.system();
        let Some(process) = system.process(Pid::from_u32(pid)) else {
            return Ok(false);
        };
        if process.kill() {
            Ok(true)
        } else {
            Err(DeployError::ProcessControlError(format!(
                "failed to send kill signal to pid {pid}"
            )))
        }
    }
}
