// src/watch/hash.rs

use std::fmt;
use std::io::{ErrorKind, Read};
use std::path::Path;

use blake3::Hasher;
use tracing::trace;

use crate::errors::{DeployError, Result};
use crate::fs::FileSystem;

/// Read buffer size; files are never loaded whole.
pub const HASH_CHUNK_SIZE: usize = 8192;

/// BLAKE3 digest of a file's bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest(blake3::Hash);

impl Digest {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes))
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell digests apart in logs.
        write!(f, "Digest({}…)", &self.0.to_hex()[..12])
    }
}

/// Compute the digest of a single file.
///
/// Any open or read failure, a locked file included, comes back as
/// [`DeployError::HashError`].
pub fn hash_file(fs: &dyn FileSystem, path: &Path) -> Result<Digest> {
    let hash_err = |source| DeployError::HashError {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = fs.open_read(path).map_err(hash_err)?;
    let mut hasher = Hasher::new();
    let mut buf = [0u8; HASH_CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(hash_err(e)),
        };
        hasher.update(&buf[..n]);
    }

    let digest = Digest(hasher.finalize());
    trace!(?path, %digest, "hashed file");
    Ok(digest)
}

/// Like [`hash_file`], but a missing file is `Ok(None)`.
pub fn hash_if_exists(fs: &dyn FileSystem, path: &Path) -> Result<Option<Digest>> {
    match hash_file(fs, path) {
        Ok(d) => Ok(Some(d)),
        Err(DeployError::HashError { source, .. }) if source.kind() == ErrorKind::NotFound => {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::RealFileSystem;
    use crate::fs::mock::MockFileSystem;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn mock_and_disk_agree_across_chunk_boundaries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let payload: Vec<u8> = (0..(HASH_CHUNK_SIZE * 3 + 17))
            .map(|i| (i * 31 % 256) as u8)
            .collect();
        std::fs::write(&path, &payload).unwrap();

        let mock = MockFileSystem::new();
        mock.add_file("/m/big.bin", payload.clone());

        let on_disk = hash_file(&RealFileSystem, &path).unwrap();
        let in_memory = hash_file(&mock, Path::new("/m/big.bin")).unwrap();

        assert_eq!(on_disk, in_memory);
        assert_eq!(on_disk, Digest::of_bytes(&payload));
    }

    #[test]
    fn known_vector() {
        let fs = MockFileSystem::new();
        fs.add_file("test.txt", b"hello world".to_vec());

        let digest = hash_file(&fs, &PathBuf::from("test.txt")).unwrap();
        assert_eq!(
            digest.to_hex(),
            "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
        );
    }

    #[test]
    fn locked_file_is_a_hash_error() {
        let fs = MockFileSystem::new();
        fs.add_file("/s/app.exe", b"x".to_vec());
        fs.lock_reads("/s/app.exe", 1);

        match hash_file(&fs, Path::new("/s/app.exe")) {
            Err(DeployError::HashError { source, .. }) => {
                assert_eq!(source.kind(), ErrorKind::PermissionDenied)
            }
            other => panic!("expected HashError, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_hashes_to_none() {
        let fs = MockFileSystem::new();
        assert_eq!(hash_if_exists(&fs, Path::new("/nope")).unwrap(), None);
    }
}
