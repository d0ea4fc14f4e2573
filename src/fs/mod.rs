// src/fs/mod.rs

//! Filesystem seam used by the hasher, the lock wait and the deployer.
//!
//! Everything returns `std::io::Result` so callers can tell a missing file
//! from a locked one. [`mock::MockFileSystem`] implements the same trait in
//! memory, with fault injection for the swap protocol.

use std::fmt::Debug;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

pub mod mock;

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    /// Copy `from` into a freshly created `to` with the same permissions,
    /// then flush and force the bytes to stable storage before returning.
    fn copy_durable(&self, from: &Path, to: &Path) -> io::Result<u64>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Force the directory entry itself to stable storage. A no-op where the
    /// platform has no such operation.
    fn sync_dir(&self, path: &Path) -> io::Result<()>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn is_executable(&self, path: &Path) -> bool;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        let file = fs::File::open(path)?;
        Ok(Box::new(file))
    }

    fn copy_durable(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let mut src = fs::File::open(from)?;
        let mut dst = fs::File::create(to)?;
        let copied = io::copy(&mut src, &mut dst)?;
        dst.set_permissions(src.metadata()?.permissions())?;
        dst.flush()?;
        dst.sync_all()?;
        Ok(copied)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    #[cfg(unix)]
    fn sync_dir(&self, path: &Path) -> io::Result<()> {
        fs::File::open(path)?.sync_all()
    }

    #[cfg(not(unix))]
    fn sync_dir(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    #[cfg(unix)]
    fn is_executable(&self, path: &Path) -> bool {
        use std::os::unix::fs::PermissionsExt;

        fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(windows)]
    fn is_executable(&self, path: &Path) -> bool {
        has_windows_executable_extension(path) && path.is_file()
    }

    #[cfg(not(any(unix, windows)))]
    fn is_executable(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// `.exe`, `.bat`, `.cmd` or `.com`, case-insensitively.
pub fn has_windows_executable_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            matches!(
                e.to_ascii_lowercase().as_str(),
                "exe" | "bat" | "cmd" | "com"
            )
        })
        .unwrap_or(false)
}
