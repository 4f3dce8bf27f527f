//! Storage tiers and the session metadata persistence adapter.
//!
//! Two tiers mirror the browser storage model:
//! - **Session** tier: lives as long as the client process (a tab).
//! - **Durable** tier: survives restarts (a JSON file on disk).
//!
//! [`SessionPersistence`] decides which tier a session's metadata lands in
//! and keeps both tiers consistent.

mod file;
mod keys;
mod memory;
mod metadata;
mod persistence;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use metadata::SessionMetadata;
pub use persistence::{SessionPersistence, DEFAULT_DURABLE_THRESHOLD_HOURS};
pub use traits::KeyValueStorage;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Which storage tier holds a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageTier {
    /// Cleared when the client process ends.
    Session,
    /// Survives restarts.
    Durable,
}

impl std::fmt::Display for StorageTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageTier::Session => write!(f, "session"),
            StorageTier::Durable => write!(f, "durable"),
        }
    }
}
