//! Persistent key-value storage for the Studydash client.
//!
//! This crate provides:
//! - **`SecureStorage`**: the backend trait (`set`/`get`/`delete`/`has`)
//! - **`FileStorage`**: a JSON map on disk, written atomically
//! - **`MemoryStorage`**: process-local storage for tests and ephemeral runs
//! - **`KeyStore`**: obfuscated persistence for third-party API credentials

mod file;
mod key_store;
mod keys;
mod memory;
mod traits;

pub use file::FileStorage;
pub use key_store::KeyStore;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::SecureStorage;

use dashboard_config_and_utils::Paths;
use std::sync::Arc;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// Key not found
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the default file-backed storage under the data directory.
pub fn create_storage(paths: &Paths) -> StorageResult<Arc<dyn SecureStorage>> {
    let storage = FileStorage::open(paths.storage_file())?;
    Ok(Arc::new(storage))
}

/// Create a KeyStore over the default storage.
pub fn create_key_store(paths: &Paths) -> StorageResult<KeyStore> {
    let storage = create_storage(paths)?;
    Ok(KeyStore::new(storage))
}
