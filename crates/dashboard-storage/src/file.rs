//! File-backed storage.
//!
//! All entries live in one JSON object on disk. Every mutation rewrites the
//! whole map through a temporary file followed by a rename, so a crash mid-write
//! leaves the previous contents intact. On unix the file is owner-only.

use crate::{SecureStorage, StorageError, StorageResult};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Owner read/write only; the file holds session tokens.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// JSON map persisted at a single path.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    data: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open (or lazily create) the storage file at `path`.
    ///
    /// An unreadable or malformed file is treated as empty; it is replaced on
    /// the next write.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let data = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Storage file is malformed, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StorageError::Io(e)),
        };

        debug!(path = %path.display(), entries = data.len(), "Opened file storage");

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn data(&self) -> StorageResult<MutexGuard<'_, BTreeMap<String, String>>> {
        self.data
            .lock()
            .map_err(|_| StorageError::Platform("file storage lock poisoned".to_string()))
    }

    fn persist(&self, data: &BTreeMap<String, String>) -> StorageResult<()> {
        let content =
            serde_json::to_string_pretty(data).map_err(|e| StorageError::Encoding(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        let write_result = (|| -> std::io::Result<()> {
            let mut options = std::fs::OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(FILE_MODE);
            }

            let mut file = options.open(&tmp)?;
            // A leftover temp file keeps its old mode.
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                file.set_permissions(std::fs::Permissions::from_mode(FILE_MODE))?;
            }
            file.write_all(content.as_bytes())?;
            file.sync_all()?;

            std::fs::rename(&tmp, &self.path)
        })();

        if let Err(e) = write_result {
            let _ = std::fs::remove_file(&tmp);
            return Err(StorageError::Io(e));
        }
        Ok(())
    }
}

impl SecureStorage for FileStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut data = self.data()?;
        let previous = data.insert(key.to_string(), value.to_string());

        if let Err(e) = self.persist(&data) {
            // Keep memory and disk in agreement.
            match previous {
                Some(old) => data.insert(key.to_string(), old),
                None => data.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.data()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut data = self.data()?;
        let Some(old) = data.remove(key) else {
            return Ok(false);
        };

        if let Err(e) = self.persist(&data) {
            data.insert(key.to_string(), old);
            return Err(e);
        }
        Ok(true)
    }

    fn list_keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .data()?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");

        let storage = FileStorage::open(&path).unwrap();
        storage.set("a", "1").unwrap();
        storage.set("b", "2").unwrap();
        assert!(storage.delete("a").unwrap());
        drop(storage);

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get("a").unwrap(), None);
        assert_eq!(reopened.get("b").unwrap(), Some("2".to_string()));
    }

    #[test]
    fn test_open_creates_parent_dirs_lazily() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        let storage = FileStorage::open(&path).unwrap();
        assert!(!path.exists());

        storage.set("k", "v").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");

        let storage = FileStorage::open(&path).unwrap();
        storage.set("k", "v").unwrap();

        assert!(!dir.path().join("storage.json.tmp").exists());
        let raw: BTreeMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.get("k").map(String::as_str), Some("v"));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        std::fs::write(dir.path().join("storage.json.tmp"), "stale").unwrap();
        std::fs::set_permissions(
            dir.path().join("storage.json.tmp"),
            std::fs::Permissions::from_mode(0o666),
        )
        .unwrap();

        let storage = FileStorage::open(&path).unwrap();
        storage.set("supabase_session", "{\"access_token\":\"at\"}").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_malformed_file_treated_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "{ not json").unwrap();

        let storage = FileStorage::open(&path).unwrap();
        assert_eq!(storage.get("anything").unwrap(), None);

        storage.set("k", "v").unwrap();
        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get("k").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn test_failed_write_rolls_back_memory() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();

        let storage = FileStorage {
            path: blocker.join("storage.json"),
            data: Mutex::new(BTreeMap::new()),
        };

        assert!(storage.set("k", "v").is_err());
        assert_eq!(storage.get("k").unwrap(), None);
    }
}
