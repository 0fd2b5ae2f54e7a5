//! Storage trait definitions.

use crate::StorageResult;

/// Trait for key-value storage backends
pub trait SecureStorage: Send + Sync {
    /// Store a value
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete a value
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// List all keys that start with a given prefix.
    fn list_keys_with_prefix(&self, _prefix: &str) -> StorageResult<Vec<String>> {
        Ok(Vec::new())
    }
}
