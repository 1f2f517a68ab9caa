//! Snapshot persistence.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Default directory snapshots are written to, relative to the working
/// directory.
pub const SNAPSHOT_DIR: &str = "snapshots";

/// Writes encoded frames to uniquely named files.
///
/// Every write generates its own UUID, so concurrent triggers from separate
/// connections can never collide on a path.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    /// Create a writer rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Persist one encoded image, returning the path it was written to.
    ///
    /// Disk failures are returned to the caller; the streaming loop logs
    /// them and keeps serving.
    pub fn write(&self, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.dir.join(format!("{}.jpg", Uuid::new_v4()));
        fs::write(&path, bytes)?;
        Ok(path)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_write_creates_jpg_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path().join("snaps")).unwrap();

        let path = writer.write(b"\xff\xd8fake-jpeg\xff\xd9").unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));
        assert_eq!(fs::read(&path).unwrap(), b"\xff\xd8fake-jpeg\xff\xd9");
    }

    #[test]
    fn test_new_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/snapshots");
        let writer = SnapshotWriter::new(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(writer.dir(), nested.as_path());
    }

    #[test]
    fn test_sequential_writes_get_unique_paths() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path()).unwrap();

        let mut paths = HashSet::new();
        for _ in 0..10 {
            assert!(paths.insert(writer.write(b"x").unwrap()));
        }
        assert_eq!(paths.len(), 10);
    }

    #[test]
    fn test_concurrent_writes_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let writer = Arc::new(SnapshotWriter::new(dir.path()).unwrap());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let writer = Arc::clone(&writer);
            handles.push(thread::spawn(move || writer.write(b"frame").unwrap()));
        }

        let mut paths = HashSet::new();
        for handle in handles {
            assert!(paths.insert(handle.join().unwrap()));
        }
        assert_eq!(paths.len(), 8);
    }
}
