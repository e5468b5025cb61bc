use std::path::{Path, PathBuf};

use async_trait::async_trait;
use blacklist_sync_core::{Items, ItemsPatch, Persistence, Result, SyncError};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

const STATE_FILE: &str = "state.json";

/// Persisted state as one JSON document under the data directory.
///
/// Writes go through a temp file and a rename, so a crash never leaves a torn file.
/// The mutex makes every read-modify-write in `store` atomic relative to `load`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(STATE_FILE),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Items> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state at {}, using defaults", self.path.display());
                return Ok(Items::default());
            }
            Err(e) => {
                return Err(SyncError::Storage(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        serde_json::from_str(&raw).map_err(|e| {
            SyncError::Storage(format!("Failed to parse {}: {}", self.path.display(), e))
        })
    }

    async fn write(&self, items: &Items) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                SyncError::Storage(format!(
                    "Failed to create data directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let data = serde_json::to_vec_pretty(items)
            .map_err(|e| SyncError::Storage(format!("Failed to serialize state: {}", e)))?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, data).await.map_err(|e| {
            SyncError::Storage(format!(
                "Failed to write temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            SyncError::Storage(format!(
                "Failed to rename temp file to {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl Persistence for JsonFileStore {
    async fn load(&self) -> Result<Items> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    #[instrument(skip(self, patch), level = "debug")]
    async fn store(&self, patch: ItemsPatch) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut items = self.read().await?;
        patch.apply_to(&mut items);
        self.write(&items).await?;
        debug!("Persisted state to {}", self.path.display());
        Ok(())
    }
}
