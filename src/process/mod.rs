// src/process/mod.rs

//! Process lifecycle around a swap.
//!
//! - [`ProcessController`] is what the deployer talks to: is it running,
//!   kill it, start it again.
//! - [`ProcessTable`] is the OS capability underneath (list processes,
//!   terminate one). [`system::SysinfoTable`] implements it for real;
//!   [`fake::FakeProcessTable`] for tests.
//! - [`SystemProcessController`] adds name matching and bounded retries on
//!   top of any table.
//! - [`launch`] starts executables detached from us.

pub mod fake;
pub mod launch;
pub mod system;

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::errors::Result;
use crate::retry::RetryPolicy;

pub use launch::{is_network_path, start_detached};
pub use system::SysinfoTable;

/// Operations the deployer needs on the process owning a target file.
pub trait ProcessController: Send + Sync + Debug {
    /// True iff a live process's executable name equals `name`,
    /// ignoring case.
    fn is_running(&self, name: &str) -> bool;

    /// Terminate every process named `name` (ignoring case). True iff at
    /// least one was found and terminated.
    fn kill(&self, name: &str) -> bool;

    /// Launch `executable` detached, from its own directory. Success only
    /// means the launch was issued.
    fn start(&self, executable: &Path) -> Result<()>;
}

/// A live process as reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
    pub cwd: Option<PathBuf>,
}

/// Process enumeration and termination capability.
pub trait ProcessTable: Send + Sync + Debug {
    /// All live processes. May fail transiently.
    fn snapshot(&self) -> Result<Vec<ProcessEntry>>;

    /// Terminate `pid`. `Ok(false)` if it was already gone.
    fn terminate(&self, pid: u32) -> Result<bool>;
}

/// [`ProcessController`] over a [`ProcessTable`], retrying enumeration and
/// termination failures under `retry`.
#[derive(Debug, Clone)]
pub struct SystemProcessController<T: ProcessTable> {
    table: T,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl<T: ProcessTable> SystemProcessController<T> {
    pub fn new(table: T, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            table,
            clock,
            retry,
        }
    }

    fn matching(&self, name: &str) -> Result<Vec<ProcessEntry>> {
        Ok(self
            .table
            .snapshot()?
            .into_iter()
            .filter(|p| p.name.eq_ignore_ascii_case(name))
            .collect())
    }
}

impl<T: ProcessTable> ProcessController for SystemProcessController<T> {
    fn is_running(&self, name: &str) -> bool {
        let found = self.retry.run(
            self.clock.as_ref(),
            |_| self.matching(name).map(|m| !m.is_empty()),
            |attempt, err| {
                warn!(process = %name, attempt, error = %err, "process enumeration failed");
            },
        );

        match found {
            Ok(running) => running,
            Err(exhausted) => {
                error!(
                    process = %name,
                    attempts = exhausted.attempts,
                    error = %exhausted.last_error,
                    "could not enumerate processes; assuming not running"
                );
                false
            }
        }
    }

    fn kill(&self, name: &str) -> bool {
        let mut killed_any = false;

        let outcome = self.retry.run(
            self.clock.as_ref(),
            |_| {
                let mut last_failure = None;
                for entry in self.matching(name)? {
                    match self.table.terminate(entry.pid) {
                        Ok(true) => {
                            killed_any = true;
                            info!(process = %name, pid = entry.pid, cwd = ?entry.cwd, "terminated process");
                        }
                        Ok(false) => {
                            debug!(process = %name, pid = entry.pid, "process already exited");
                        }
                        Err(e) => last_failure = Some(e),
                    }
                }
                match last_failure {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            },
            |attempt, err| {
                warn!(process = %name, attempt, error = %err, "failed to kill process; retrying");
            },
        );

        if let Err(exhausted) = outcome {
            error!(
                process = %name,
                attempts = exhausted.attempts,
                error = %exhausted.last_error,
                "giving up on killing process"
            );
        }
        killed_any
    }

    fn start(&self, executable: &Path) -> Result<()> {
        start_detached(executable)
    }
}
