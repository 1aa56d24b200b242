//! Settings persistence.
//!
//! The coordinator is the only writer. Stores are async so a slow backing
//! medium never stalls the coordinator's other work beyond its own await.

use std::future::Future;
use std::path::PathBuf;

use tokio::sync::Mutex;

use super::SettingsRecord;
use crate::error::ProtocolError;

/// Async key-value home of the settings record
pub trait SettingsStore: Send + Sync {
    /// Stored record, or None when nothing has been saved yet
    fn load(&self) -> impl Future<Output = Result<Option<SettingsRecord>, ProtocolError>> + Send;

    fn save(&self, record: &SettingsRecord) -> impl Future<Output = Result<(), ProtocolError>> + Send;
}

/// In-memory store for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryStore {
    record: Mutex<Option<SettingsRecord>>,
    writes: Mutex<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: SettingsRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
            writes: Mutex::new(0),
        }
    }

    /// Number of completed saves
    pub async fn write_count(&self) -> u64 {
        *self.writes.lock().await
    }
}

impl SettingsStore for MemoryStore {
    async fn load(&self) -> Result<Option<SettingsRecord>, ProtocolError> {
        Ok(self.record.lock().await.clone())
    }

    async fn save(&self, record: &SettingsRecord) -> Result<(), ProtocolError> {
        *self.record.lock().await = Some(record.clone());
        *self.writes.lock().await += 1;
        Ok(())
    }
}

/// JSON file store
///
/// Writes go to a sibling temp file first and are renamed into place.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsStore for JsonFileStore {
    async fn load(&self) -> Result<Option<SettingsRecord>, ProtocolError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(ProtocolError::StoreRead {
                    reason: err.to_string(),
                })
            }
        };

        let record: SettingsRecord =
            serde_json::from_str(&contents).map_err(|err| ProtocolError::StoreRead {
                reason: format!("{:?}: {}", self.path, err),
            })?;
        Ok(Some(record.normalized()))
    }

    async fn save(&self, record: &SettingsRecord) -> Result<(), ProtocolError> {
        let json = serde_json::to_string_pretty(record).map_err(|err| ProtocolError::StoreWrite {
            reason: err.to_string(),
        })?;

        let tmp = self.path.with_extension("json.tmp");
        let write_err = |err: std::io::Error| ProtocolError::StoreWrite {
            reason: format!("{:?}: {}", self.path, err),
        };
        tokio::fs::write(&tmp, json).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(write_err)?;
        Ok(())
    }
}
