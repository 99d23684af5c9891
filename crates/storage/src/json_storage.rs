//! JSON file snapshot store.
//!
//! Writes the snapshot as pretty JSON next to a small meta marker holding a
//! save counter and the save time. Saves go through a temporary file and a
//! rename so a crash never leaves a truncated snapshot behind.

use std::path::{Path, PathBuf};

use questline_core::QuestSnapshot;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{Result, SnapshotStore};

/// File-based JSON snapshot store.
pub struct JsonSnapshotStore {
    path: PathBuf,
    /// Serializes writers so temp files never collide
    write_lock: Mutex<()>,
}

impl JsonSnapshotStore {
    /// Create a store writing to `path`, creating parent directories.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    fn meta_path(&self) -> PathBuf {
        self.path.with_extension("meta.json")
    }

    /// Read and increment the save counter, return the new value.
    async fn bump_version(&self) -> Result<u64> {
        let path = self.meta_path();
        let mut version = 0u64;
        if let Ok(s) = fs::read_to_string(&path).await {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&s) {
                if let Some(v) = json.get("version").and_then(|v| v.as_u64()) {
                    version = v;
                }
            }
        }
        version += 1;
        let meta = serde_json::json!({"version": version, "saved_at": chrono::Utc::now()});
        fs::write(&path, serde_json::to_string_pretty(&meta)?.as_bytes()).await?;
        Ok(version)
    }
}

#[async_trait::async_trait]
impl SnapshotStore for JsonSnapshotStore {
    async fn load(&self) -> Result<Option<QuestSnapshot>> {
        match fs::read_to_string(&self.path).await {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(snapshot) => Ok(Some(snapshot)),
                Err(e) => {
                    // An unreadable snapshot only costs a refetch.
                    warn!("Discarding unreadable snapshot {}: {}", self.path.display(), e);
                    Ok(None)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, snapshot: &QuestSnapshot) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, json.as_bytes()).await?;
        fs::rename(&tmp, &self.path).await?;

        let version = self.bump_version().await?;
        debug!("Saved snapshot v{} to {}", version, self.path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        for path in [self.path.clone(), self.meta_path()] {
            fs::remove_file(&path).await.or_else(|e| {
                if e.kind() == std::io::ErrorKind::NotFound { Ok(()) } else { Err(e) }
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use questline_core::{Goal, GoalId, GoalStatus, RoadmapStatus};

    fn snapshot() -> QuestSnapshot {
        let now = chrono::Utc::now();
        QuestSnapshot {
            goals: vec![Goal {
                id: GoalId::new("g1"),
                title: "Read 12 books".to_string(),
                description: String::new(),
                category: "learning".to_string(),
                target_date: None,
                status: GoalStatus::Active,
                roadmap_status: RoadmapStatus::None,
                created_at: now,
                updated_at: now,
            }],
            last_fetch: Some(now),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("snapshot.json"))
            .await
            .unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("nested").join("snapshot.json"))
            .await
            .unwrap();

        let saved = snapshot();
        store.save(&saved).await.unwrap();
        store.save(&saved).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert!(!store.tmp_path().exists());

        let meta: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.meta_path()).unwrap()).unwrap();
        assert_eq!(meta["version"], 2);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonSnapshotStore::new(&path).await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("snapshot.json"))
            .await
            .unwrap();
        store.save(&snapshot()).await.unwrap();

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        assert!(!store.meta_path().exists());

        // Clearing twice is fine.
        store.clear().await.unwrap();
    }
}
