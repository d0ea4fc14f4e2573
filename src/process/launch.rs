// src/process/launch.rs

//! Fire-and-forget process launch.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::errors::{DeployError, Result};

/// True for network-addressed paths (`\\server\share\...`,
/// `\\?\UNC\server\...`). Executables there are not started.
pub fn is_network_path(path: &Path) -> bool {
    let s = path.to_string_lossy();
    if s.starts_with(r"\\?\UNC\") {
        return true;
    }
    if s.starts_with(r"\\?\") || s.starts_with(r"\\.\") {
        return false;
    }
    s.starts_with(r"\\") || (cfg!(windows) && s.starts_with("//"))
}

fn working_dir_of(executable: &Path) -> PathBuf {
    match executable.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Launch `executable` from its own directory without waiting for it.
///
/// Windows goes through `cmd /C start "" /MIN <name>` so the program gets
/// a minimized window of its own. On Unix the child is put in a new
/// process group and reaped on a background thread.
pub fn start_detached(executable: &Path) -> Result<()> {
    if is_network_path(executable) {
        warn!(path = ?executable, "target is on a network path; not starting it");
        return Err(DeployError::ProcessControlError(format!(
            "refusing to start {executable:?} from a network path"
        )));
    }

    let executable = std::path::absolute(executable)?;
    let dir = working_dir_of(&executable);
    info!(path = ?executable, cwd = ?dir, "starting process");

    let mut cmd = build_command(&executable);
    cmd.current_dir(&dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let mut child = cmd.spawn().map_err(|e| {
        DeployError::ProcessControlError(format!("failed to start {executable:?}: {e}"))
    })?;
    debug!(pid = child.id(), "process launched");

    std::thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(())
}

#[cfg(windows)]
fn build_command(executable: &Path) -> Command {
    use std::os::windows::process::CommandExt;

    const CREATE_NO_WINDOW: u32 = 0x0800_0000;

    let name = executable
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| executable.as_os_str().to_os_string());
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg("start").arg("").arg("/MIN").arg(name);
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd
}

#[cfg(unix)]
fn build_command(executable: &Path) -> Command {
    use std::os::unix::process::CommandExt;

    let mut cmd = Command::new(executable);
    cmd.process_group(0);
    cmd
}

#[cfg(not(any(unix, windows)))]
fn build_command(executable: &Path) -> Command {
    Command::new(executable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unc_paths_are_network_paths() {
        assert!(is_network_path(Path::new(r"\\fileserver\builds\app.exe")));
        assert!(is_network_path(Path::new(r"\\?\UNC\fileserver\builds\app.exe")));
    }

    #[test]
    fn local_and_verbatim_paths_are_not() {
        assert!(!is_network_path(Path::new(r"C:\Ark\app.exe")));
        assert!(!is_network_path(Path::new(r"\\?\C:\Ark\app.exe")));
        assert!(!is_network_path(Path::new("/opt/ark/app")));
        assert!(!is_network_path(Path::new("relative/app")));
    }

    #[test]
    fn start_refuses_network_paths() {
        let err = start_detached(Path::new(r"\\fileserver\builds\app.exe")).unwrap_err();
        assert!(matches!(err, DeployError::ProcessControlError(_)));
    }

    #[cfg(unix)]
    #[test]
    fn start_runs_from_the_executable_directory() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::{Duration, Instant};

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("touch-marker.sh");
        std::fs::write(&script, "#!/bin/sh\necho started > marker.txt\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        // Another test thread forking while the script was open for
        // writing can make exec fail with ETXTBSY for a moment.
        let mut started = start_detached(&script);
        for _ in 0..5 {
            if started.is_ok() {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
            started = start_detached(&script);
        }
        started.unwrap();

        let marker = dir.path().join("marker.txt");
        let deadline = Instant::now() + Duration::from_secs(5);
        while !marker.exists() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(marker.exists(), "script did not run in its own directory");
    }
}
