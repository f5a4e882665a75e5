//! Directory-backed blob store for persistent replicas.

use crate::backend::{validate_key, BlobStore};
use crate::error::StorageResult;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// A blob store that keeps each key in its own file under a directory.
///
/// Data survives process restarts.
///
/// # Durability
///
/// `put` writes to `<key>.tmp`, calls `File::sync_all()`, then renames over
/// `<key>`. A crash mid-write leaves either the old or the new document,
/// never a torn one.
///
/// # Example
///
/// ```no_run
/// use spendsync_storage::{BlobStore, FileBlobStore};
/// use std::path::Path;
///
/// let store = FileBlobStore::open(Path::new("replica")).unwrap();
/// store.put("expenses", b"[]").unwrap();
/// ```
#[derive(Debug)]
pub struct FileBlobStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileBlobStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the directory holding the documents.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl BlobStore for FileBlobStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        match fs::read(self.key_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        let _guard = self.write_lock.lock();

        let target = self.key_path(key);
        let tmp = self.dir.join(format!("{key}.tmp"));

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(value)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &target)?;

        // Make the rename itself durable where the platform allows it
        if let Ok(dir) = File::open(&self.dir) {
            let _ = dir.sync_all();
        }

        tracing::trace!(key, bytes = value.len(), "blob written");
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_missing_key_is_none() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();
        assert_eq!(store.get("expenses").unwrap(), None);
    }

    #[test]
    fn file_put_and_get() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();

        store.put("expenses", b"[1,2,3]").unwrap();
        assert_eq!(store.get("expenses").unwrap(), Some(b"[1,2,3]".to_vec()));
        assert!(!dir.path().join("expenses.tmp").exists());
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();

        {
            let store = FileBlobStore::open(dir.path()).unwrap();
            store.put("sync_state", b"persistent").unwrap();
        }

        {
            let store = FileBlobStore::open(dir.path()).unwrap();
            assert_eq!(
                store.get("sync_state").unwrap(),
                Some(b"persistent".to_vec())
            );
        }
    }

    #[test]
    fn file_overwrite_shrinks() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();

        store.put("expenses", b"a long document").unwrap();
        store.put("expenses", b"short").unwrap();
        assert_eq!(store.get("expenses").unwrap(), Some(b"short".to_vec()));
    }

    #[test]
    fn file_remove() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();

        store.put("expenses", b"x").unwrap();
        store.remove("expenses").unwrap();
        assert_eq!(store.get("expenses").unwrap(), None);
        store.remove("expenses").unwrap();
    }

    #[test]
    fn file_creates_nested_dirs() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");

        let store = FileBlobStore::open(&nested).unwrap();
        assert!(nested.exists());
        assert_eq!(store.path(), nested);
    }

    #[test]
    fn file_rejects_path_traversal() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();
        assert!(store.put("../escape", b"x").is_err());
    }
}
