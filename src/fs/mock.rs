// src/fs/mock.rs

use super::FileSystem;
use std::collections::{HashMap, HashSet};
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct MockFile {
    content: Vec<u8>,
    executable: bool,
}

/// Mutating operation recorded by [`MockFileSystem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOp {
    Copy { from: PathBuf, to: PathBuf },
    Remove(PathBuf),
    Rename { from: PathBuf, to: PathBuf },
    SyncDir(PathBuf),
}

#[derive(Debug, Default)]
struct MockState {
    files: HashMap<PathBuf, MockFile>,
    dirs: HashSet<PathBuf>,
    ops: Vec<MockOp>,
    // Remaining failures per path; `u32::MAX` never runs out.
    locked_reads: HashMap<PathBuf, u32>,
    locked_removes: HashMap<PathBuf, u32>,
    failing_copies: HashSet<PathBuf>,
    failing_renames: HashSet<PathBuf>,
}

/// In-memory filesystem with fault injection.
///
/// Clones share state, so a test can keep one handle for assertions while
/// the deployer owns another.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

fn locked() -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        "file is in use by another process",
    )
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such file: {path:?}"))
}

fn take_failure(map: &mut HashMap<PathBuf, u32>, path: &Path) -> bool {
    match map.get_mut(path) {
        Some(0) | None => false,
        Some(n) if *n == u32::MAX => true,
        Some(n) => {
            *n -= 1;
            true
        }
    }
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.insert(path.as_ref(), content.into(), false);
    }

    pub fn add_executable(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.insert(path.as_ref(), content.into(), true);
    }

    fn insert(&self, path: &Path, content: Vec<u8>, executable: bool) {
        let mut state = self.state();
        if let Some(parent) = path.parent() {
            state.dirs.insert(parent.to_path_buf());
        }
        state
            .files
            .insert(path.to_path_buf(), MockFile { content, executable });
    }

    /// Current bytes of `path`, if it exists.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.state()
            .files
            .get(path.as_ref())
            .map(|f| f.content.clone())
    }

    /// Every mutating operation performed so far, in order.
    pub fn ops(&self) -> Vec<MockOp> {
        self.state().ops.clone()
    }

    /// Fail the next `times` opens of `path` as if another writer held it.
    pub fn lock_reads(&self, path: impl AsRef<Path>, times: u32) {
        self.state()
            .locked_reads
            .insert(path.as_ref().to_path_buf(), times);
    }

    /// Fail the next `times` removals of `path` with a permission error.
    /// `u32::MAX` keeps it locked forever.
    pub fn lock_removes(&self, path: impl AsRef<Path>, times: u32) {
        self.state()
            .locked_removes
            .insert(path.as_ref().to_path_buf(), times);
    }

    /// Make every copy into `to` fail after writing half the bytes.
    pub fn fail_copies_into(&self, to: impl AsRef<Path>) {
        self.state().failing_copies.insert(to.as_ref().to_path_buf());
    }

    /// Make every rename onto `to` fail.
    pub fn fail_renames_onto(&self, to: impl AsRef<Path>) {
        self.state()
            .failing_renames
            .insert(to.as_ref().to_path_buf());
    }

    fn read_bytes(state: &mut MockState, path: &Path) -> io::Result<Vec<u8>> {
        if take_failure(&mut state.locked_reads, path) {
            return Err(locked());
        }
        state
            .files
            .get(path)
            .map(|f| f.content.clone())
            .ok_or_else(|| not_found(path))
    }
}

impl FileSystem for MockFileSystem {
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        let mut state = self.state();
        let bytes = Self::read_bytes(&mut state, path)?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn copy_durable(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let mut state = self.state();
        state.ops.push(MockOp::Copy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        });
        let bytes = Self::read_bytes(&mut state, from)?;

        if state.failing_copies.contains(to) {
            let half = bytes[..bytes.len() / 2].to_vec();
            state.files.insert(
                to.to_path_buf(),
                MockFile {
                    content: half,
                    executable: false,
                },
            );
            return Err(io::Error::other("disk full"));
        }

        let executable = state.files.get(from).map(|f| f.executable).unwrap_or(false);
        let len = bytes.len() as u64;
        state.files.insert(
            to.to_path_buf(),
            MockFile {
                content: bytes,
                executable,
            },
        );
        Ok(len)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state();
        state.ops.push(MockOp::Remove(path.to_path_buf()));
        if take_failure(&mut state.locked_removes, path) {
            return Err(locked());
        }
        state
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut state = self.state();
        state.ops.push(MockOp::Rename {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        });
        if state.failing_renames.contains(to) {
            return Err(io::Error::other("rename refused"));
        }
        let file = state.files.remove(from).ok_or_else(|| not_found(from))?;
        state.files.insert(to.to_path_buf(), file);
        Ok(())
    }

    fn sync_dir(&self, path: &Path) -> io::Result<()> {
        self.state().ops.push(MockOp::SyncDir(path.to_path_buf()));
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state();
        let mut current = Some(path);
        while let Some(dir) = current {
            if dir.as_os_str().is_empty() {
                break;
            }
            state.dirs.insert(dir.to_path_buf());
            current = dir.parent();
        }
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.state();
        state.files.contains_key(path) || state.dirs.contains(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.state().files.contains_key(path)
    }

    fn is_executable(&self, path: &Path) -> bool {
        self.state()
            .files
            .get(path)
            .map(|f| f.executable)
            .unwrap_or(false)
    }
}
