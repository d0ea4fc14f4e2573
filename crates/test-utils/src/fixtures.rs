use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use autodeploy::types::WatchRule;

/// Temporary `build/` and `deploy/` directories on the real disk.
pub struct DiskFixture {
    dir: TempDir,
}

impl DiskFixture {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("build"))?;
        fs::create_dir_all(dir.path().join("deploy"))?;
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn source_path(&self, name: &str) -> PathBuf {
        self.root().join("build").join(name)
    }

    pub fn target_path(&self, name: &str) -> PathBuf {
        self.root().join("deploy").join(name)
    }

    pub fn write_source(&self, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.source_path(name);
        fs::write(&path, bytes)?;
        Ok(path)
    }

    pub fn write_target(&self, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.target_path(name);
        fs::write(&path, bytes)?;
        Ok(path)
    }

    pub fn read_target(&self, name: &str) -> Option<Vec<u8>> {
        fs::read(self.target_path(name)).ok()
    }

    /// Entries of `deploy/`, sorted.
    pub fn deploy_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.root().join("deploy"))
            .map(|rd| {
                rd.filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Rule `name` from `build/<file>` to `deploy/<file>`.
    pub fn rule(&self, name: &str, file: &str) -> WatchRule {
        WatchRule {
            name: name.to_string(),
            process_name: file.to_string(),
            source_path: self.source_path(file),
            target_path: self.target_path(file),
            companion_process: None,
        }
    }
}
