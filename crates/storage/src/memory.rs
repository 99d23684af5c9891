//! In-memory snapshot store.

use questline_core::QuestSnapshot;
use tokio::sync::Mutex;

use super::{Result, SnapshotStore};

/// Keeps the snapshot in memory; counts saves.
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshot: Mutex<Option<QuestSnapshot>>,
    saves: Mutex<usize>,
}

impl MemorySnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `snapshot`.
    pub fn with_snapshot(snapshot: QuestSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            saves: Mutex::new(0),
        }
    }

    /// Number of saves so far.
    pub async fn saves(&self) -> usize {
        *self.saves.lock().await
    }

    /// Currently stored snapshot.
    pub async fn current(&self) -> Option<QuestSnapshot> {
        self.snapshot.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> Result<Option<QuestSnapshot>> {
        Ok(self.snapshot.lock().await.clone())
    }

    async fn save(&self, snapshot: &QuestSnapshot) -> Result<()> {
        *self.snapshot.lock().await = Some(snapshot.clone());
        *self.saves.lock().await += 1;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.snapshot.lock().await = None;
        Ok(())
    }
}
