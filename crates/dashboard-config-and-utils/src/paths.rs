//! File system paths.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Manages file system paths for the dashboard.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.studydash)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.studydash`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".studydash"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.studydash).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.studydash/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Persistent key-value store backing credentials and the session
    /// snapshot (~/.studydash/storage.json).
    pub fn storage_file(&self) -> PathBuf {
        self.base_dir.join("storage.json")
    }

    /// Get the logs directory (~/.studydash/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
