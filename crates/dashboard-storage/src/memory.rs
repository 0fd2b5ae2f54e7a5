//! In-memory storage.

use crate::{SecureStorage, StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Process-local storage. Used by tests and `--ephemeral` runs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> StorageResult<MutexGuard<'_, HashMap<String, String>>> {
        self.data
            .lock()
            .map_err(|_| StorageError::Platform("memory storage lock poisoned".to_string()))
    }
}

impl SecureStorage for MemoryStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.data()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.data()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.data()?.remove(key).is_some())
    }

    fn list_keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .data()?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new();

        storage.set("test_key", "test_value").unwrap();
        assert_eq!(storage.get("test_key").unwrap(), Some("test_value".to_string()));

        assert!(storage.has("test_key").unwrap());
        assert!(!storage.has("nonexistent").unwrap());

        assert!(storage.delete("test_key").unwrap());
        assert!(!storage.delete("test_key").unwrap());
        assert_eq!(storage.get("test_key").unwrap(), None);
    }

    #[test]
    fn test_list_keys_with_prefix() {
        let storage = MemoryStorage::new();
        storage.set("credential.b", "1").unwrap();
        storage.set("credential.a", "2").unwrap();
        storage.set("auth_session_cache", "{}").unwrap();

        assert_eq!(
            storage.list_keys_with_prefix("credential.").unwrap(),
            vec!["credential.a".to_string(), "credential.b".to_string()]
        );
    }
}
