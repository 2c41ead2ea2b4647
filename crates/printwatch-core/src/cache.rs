use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::PersistenceError;
use crate::snapshot::PrinterData;

/// Bump when fields are added to or removed from [`CacheRecord`].
pub const SCHEMA_VERSION: u32 = 1;
pub const NAMESPACE: &str = "printwatch";

/// Last fresh capture of a device. Stale republishes are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub version: u32,
    pub snapshot: PrinterData,
    pub timestamp: DateTime<Utc>,
    pub device_identity: String,
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn read(&self) -> Result<Option<CacheRecord>, PersistenceError>;
    /// Replaces the whole record; readers never observe a partial write.
    async fn write(&self, record: &CacheRecord) -> Result<(), PersistenceError>;
}

/// One pretty-printed JSON file per `(namespace, registration id)`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>, registration_id: &str) -> Self {
        let file_name = format!("{NAMESPACE}_cached_data_{}.json", sanitize(registration_id));
        Self {
            path: dir.as_ref().join(file_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn read(&self) -> Result<Option<CacheRecord>, PersistenceError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let value: serde_json::Value = serde_json::from_slice(&raw)?;
        let found = value.get("version").and_then(|v| v.as_u64()).unwrap_or_default();
        if u32::try_from(found).ok() != Some(SCHEMA_VERSION) {
            return Err(PersistenceError::SchemaVersion {
                found,
                expected: SCHEMA_VERSION,
            });
        }

        Ok(Some(serde_json::from_value(value)?))
    }

    async fn write(&self, record: &CacheRecord) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(record)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Load-once / save-on-success wrapper. Neither operation ever fails its
/// caller: a bad cache degrades to "no cache", a failed save is logged.
pub struct CacheStore<S: SnapshotStore> {
    store: S,
    device_identity: String,
    op_timeout: Duration,
}

impl<S: SnapshotStore> CacheStore<S> {
    pub fn new(store: S, device_identity: impl Into<String>, op_timeout: Duration) -> Self {
        Self {
            store,
            device_identity: device_identity.into(),
            op_timeout,
        }
    }

    pub fn device_identity(&self) -> &str {
        &self.device_identity
    }

    pub async fn load(&self) -> Option<CacheRecord> {
        let record = match self.read_checked().await {
            Ok(record) => record,
            Err(err) => {
                warn!(device = %self.device_identity, error = %err, "ignoring unusable cached snapshot");
                return None;
            }
        };

        match &record {
            Some(record) => debug!(device = %self.device_identity, captured_at = %record.timestamp, "loaded cached snapshot"),
            None => debug!(device = %self.device_identity, "no cached snapshot"),
        }
        record
    }

    async fn read_checked(&self) -> Result<Option<CacheRecord>, PersistenceError> {
        let record = timeout(self.op_timeout, self.store.read())
            .await
            .map_err(|_| PersistenceError::Timeout)??;

        match record {
            Some(record) if record.device_identity != self.device_identity => {
                Err(PersistenceError::IdentityMismatch {
                    found: record.device_identity,
                    expected: self.device_identity.clone(),
                })
            }
            other => Ok(other),
        }
    }

    pub async fn save(&self, snapshot: &PrinterData, timestamp: DateTime<Utc>) {
        let record = CacheRecord {
            version: SCHEMA_VERSION,
            snapshot: snapshot.clone(),
            timestamp,
            device_identity: self.device_identity.clone(),
        };

        let result = timeout(self.op_timeout, self.store.write(&record))
            .await
            .map_err(|_| PersistenceError::Timeout)
            .and_then(|inner| inner);

        if let Err(err) = result {
            warn!(device = %self.device_identity, error = %err, "failed to persist snapshot");
        }
    }
}
