// src/watch/lock_wait.rs

//! Wait for a writer to let go of a freshly changed source file.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, error};

use crate::clock::Clock;
use crate::errors::{DeployError, Result};
use crate::fs::FileSystem;

/// Poll until `path` opens for reading, for at most `timeout`.
///
/// A file that does not exist (or stops existing) ends the wait at once;
/// any other open error is treated as "still locked" and polled again
/// every `poll`. Both failure modes map to
/// [`DeployError::SourceUnavailable`].
pub fn wait_until_unlocked(
    fs: &dyn FileSystem,
    clock: &dyn Clock,
    path: &Path,
    timeout: Duration,
    poll: Duration,
) -> Result<()> {
    let start = clock.now();
    let mut polls = 0u32;
    loop {
        match fs.open_read(path) {
            Ok(_) => {
                if polls > 0 {
                    debug!(?path, polls, "source file lock released");
                }
                return Ok(());
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DeployError::SourceUnavailable {
                    path: path.to_path_buf(),
                    reason: "file disappeared".to_string(),
                });
            }
            Err(e) => {
                if clock.now().saturating_duration_since(start) > timeout {
                    error!(?path, error = %e, "timeout waiting for file lock");
                    return Err(DeployError::SourceUnavailable {
                        path: path.to_path_buf(),
                        reason: format!("still locked after {timeout:?}: {e}"),
                    });
                }
                polls += 1;
                clock.sleep(poll);
            }
        }
    }
}
