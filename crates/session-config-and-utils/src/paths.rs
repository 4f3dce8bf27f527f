//! File system paths for the session client.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Manages file system paths for the session client.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for client files (~/.learnhub)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.learnhub`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".learnhub"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.learnhub).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.learnhub/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the storage directory (~/.learnhub/storage).
    pub fn storage_dir(&self) -> PathBuf {
        self.base_dir.join("storage")
    }

    /// Durable key/value store that survives restarts
    /// (~/.learnhub/storage/local.json).
    pub fn durable_storage_file(&self) -> PathBuf {
        self.storage_dir().join("local.json")
    }

    /// Get the logs directory (~/.learnhub/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the structured log file path (~/.learnhub/logs/client.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("client.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.storage_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
