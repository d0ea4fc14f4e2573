// src/deploy/swap.rs

//! Copy-to-temp, remove, rename: the part of a deploy that touches the
//! target file.

use std::io::{self, ErrorKind};
use std::path::Path;

use tracing::{debug, error, warn};

use crate::clock::Clock;
use crate::errors::{DeployError, Result};
use crate::fs::FileSystem;
use crate::process::ProcessController;
use crate::retry::RetryPolicy;
use crate::types::WatchRule;

/// Errors that mean "someone still has the file open".
pub fn is_lock_error(err: &io::Error) -> bool {
    if matches!(err.kind(), ErrorKind::PermissionDenied | ErrorKind::ResourceBusy) {
        return true;
    }
    // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
    cfg!(windows) && matches!(err.raw_os_error(), Some(32) | Some(33))
}

/// Collaborators borrowed for one swap.
pub(crate) struct SwapContext<'a> {
    pub fs: &'a dyn FileSystem,
    pub processes: &'a dyn ProcessController,
    pub clock: &'a dyn Clock,
    pub remove_retry: RetryPolicy,
}

/// Replace `rule.target_path` with the bytes of `rule.source_path`.
///
/// 1. Copy the source into the staging file next to the target, fsynced.
/// 2. Remove the target, retrying lock errors and killing the rule's
///    process between attempts.
/// 3. Rename the staging file onto the target, then fsync the directory.
///
/// On any failure the staging file is removed (best effort) and the error
/// returned; the target is untouched unless step 2 already removed it.
pub(crate) fn swap_into_place(ctx: &SwapContext<'_>, rule: &WatchRule) -> Result<()> {
    let tmp = rule.temp_path();

    let result = stage_and_rename(ctx, rule, &tmp);
    if result.is_err() {
        discard_temp(ctx.fs, &tmp);
    }
    result
}

fn stage_and_rename(ctx: &SwapContext<'_>, rule: &WatchRule, tmp: &Path) -> Result<()> {
    let target = &rule.target_path;

    let bytes = ctx
        .fs
        .copy_durable(&rule.source_path, tmp)
        .map_err(|source| DeployError::SwapFailure {
            path: tmp.to_path_buf(),
            source,
        })?;
    debug!(rule = %rule.name, ?tmp, bytes, "staged new content");

    remove_target(ctx, rule)?;

    ctx.fs
        .rename(tmp, target)
        .map_err(|source| {
            error!(
                rule = %rule.name,
                ?target,
                "rename failed after the old target was removed; target is missing"
            );
            DeployError::SwapFailure {
                path: target.to_path_buf(),
                source,
            }
        })?;

    if let Some(dir) = target.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Err(e) = ctx.fs.sync_dir(dir) {
            warn!(rule = %rule.name, ?dir, error = %e, "failed to sync target directory");
        }
    }
    Ok(())
}

fn remove_target(ctx: &SwapContext<'_>, rule: &WatchRule) -> Result<()> {
    let target = &rule.target_path;

    // Ok(Err(_)) is a failure not worth retrying.
    let removed = ctx.remove_retry.run(
        ctx.clock,
        |_| match ctx.fs.remove_file(target) {
            Ok(()) => Ok(Ok(())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Ok(())),
            Err(e) if is_lock_error(&e) => Err(e),
            Err(e) => Ok(Err(e)),
        },
        |attempt, err| {
            debug!(
                rule = %rule.name,
                attempt,
                error = %err,
                "something is accessing the target file, waiting"
            );
            ctx.processes.kill(&rule.process_name);
        },
    );

    match removed {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(DeployError::SwapFailure {
            path: target.to_path_buf(),
            source,
        }),
        Err(exhausted) => {
            error!(
                rule = %rule.name,
                ?target,
                attempts = exhausted.attempts,
                error = %exhausted.last_error,
                "target file still locked"
            );
            Err(DeployError::LockContention {
                path: target.to_path_buf(),
                attempts: exhausted.attempts,
            })
        }
    }
}

fn discard_temp(fs: &dyn FileSystem, tmp: &Path) {
    if !fs.exists(tmp) {
        return;
    }
    match fs.remove_file(tmp) {
        Ok(()) => debug!(?tmp, "removed temporary file"),
        Err(e) => error!(?tmp, error = %e, "failed to remove temporary file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_counts_as_locked() {
        let err = io::Error::new(ErrorKind::PermissionDenied, "in use");
        assert!(is_lock_error(&err));
        assert!(!is_lock_error(&io::Error::new(ErrorKind::InvalidInput, "bad")));
    }
}
