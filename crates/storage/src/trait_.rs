//! Snapshot store trait abstraction.

use async_trait::async_trait;
use questline_core::QuestSnapshot;

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Persistence for the quest snapshot.
///
/// This trait allows different storage backends to be plugged in.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the last saved snapshot, `None` on first start.
    async fn load(&self) -> Result<Option<QuestSnapshot>>;

    /// Replace the saved snapshot.
    async fn save(&self, snapshot: &QuestSnapshot) -> Result<()>;

    /// Remove the saved snapshot (sign-out).
    async fn clear(&self) -> Result<()>;
}
