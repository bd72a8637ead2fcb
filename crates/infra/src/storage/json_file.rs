//! File-backed queue store.
//!
//! Each key is written as a versioned JSON envelope next to a SHA-256 sidecar
//! (`<key>.json` + `<key>.sha256`). Writes go to a temp file that is fsynced
//! and renamed over the target, so a crash leaves either the old or the new
//! file, never a torn one.
//!
//! A queue file that cannot be parsed at all is moved aside and the queue
//! starts empty; individual malformed records are returned as-is so the
//! queue can drop and count them.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use checksync_core::{LoadedQueue, QueueStore};
use checksync_domain::constants::{QUEUE_STORAGE_KEY, SYNC_STATUS_STORAGE_KEY};
use checksync_domain::{ChecksyncError, QueuedAction, Result, SyncStatusRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::errors::InfraError;

/// On-disk envelope version
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    version: u32,
    saved_at: DateTime<Utc>,
    item_count: usize,
    data: T,
}

/// [`QueueStore`] that keeps one JSON file per key in a directory.
#[derive(Debug)]
pub struct JsonFileQueueStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileQueueStore {
    /// Store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), write_lock: Mutex::new(()) }
    }

    /// Directory holding the store files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the data file for `key`.
    #[must_use]
    pub fn data_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn checksum_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.sha256"))
    }

    #[instrument(skip(self, data), fields(dir = %self.dir.display()))]
    async fn write_envelope<T: Serialize + Sync>(
        &self,
        key: &str,
        data: &T,
        item_count: usize,
    ) -> std::result::Result<(), InfraError> {
        let envelope =
            Envelope { version: FORMAT_VERSION, saved_at: Utc::now(), item_count, data };
        let bytes = serde_json::to_vec(&envelope)?;
        let checksum = checksum(&bytes);

        let _guard = self.write_lock.lock().await;
        fs::create_dir_all(&self.dir).await?;

        let target = self.data_path(key);
        let temp = target.with_extension("json.tmp");
        let mut file =
            fs::OpenOptions::new().write(true).create(true).truncate(true).open(&temp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp, &target).await?;

        if let Err(err) = fs::write(self.checksum_path(key), &checksum).await {
            warn!(key, error = %err, "Failed to write checksum sidecar");
        }

        debug!(key, items = item_count, bytes = bytes.len(), "Store file written");
        Ok(())
    }

    /// Raw file contents for `key`, or `None` if nothing was saved yet.
    async fn read_verified(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, InfraError> {
        let path = self.data_path(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Store file does not exist yet");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        match fs::read_to_string(self.checksum_path(key)).await {
            Ok(expected) if expected.trim() != checksum(&bytes) => {
                warn!(key, "Checksum mismatch; file may have been modified outside the store");
            }
            Ok(_) => {}
            Err(err) => debug!(key, error = %err, "No readable checksum sidecar"),
        }

        Ok(Some(bytes))
    }

    /// Move an unreadable file out of the way so the next save starts clean.
    async fn quarantine(&self, key: &str) {
        let path = self.data_path(key);
        let aside = path.with_extension(format!("corrupt-{}", Utc::now().timestamp_millis()));
        match fs::rename(&path, &aside).await {
            Ok(()) => warn!(from = %path.display(), to = %aside.display(), "Quarantined unreadable store file"),
            Err(err) => warn!(path = %path.display(), error = %err, "Failed to quarantine store file"),
        }
    }
}

#[async_trait]
impl QueueStore for JsonFileQueueStore {
    async fn load_queue(&self) -> Result<LoadedQueue> {
        let Some(bytes) = self.read_verified(QUEUE_STORAGE_KEY).await? else {
            return Ok(LoadedQueue::default());
        };

        match serde_json::from_slice::<Envelope<Vec<Value>>>(&bytes) {
            Ok(envelope) => {
                if envelope.version != FORMAT_VERSION {
                    warn!(
                        expected = FORMAT_VERSION,
                        found = envelope.version,
                        "Queue file version mismatch; loading anyway"
                    );
                }
                info!(records = envelope.data.len(), "Queue file loaded");
                Ok(LoadedQueue::from(envelope.data))
            }
            Err(err) => {
                let lost = recover_item_count(&bytes).unwrap_or(1).max(1);
                warn!(error = %err, lost, "Queue file is unreadable; starting with an empty queue");
                self.quarantine(QUEUE_STORAGE_KEY).await;
                Ok(LoadedQueue { records: Vec::new(), unreadable: lost })
            }
        }
    }

    async fn save_queue(&self, actions: &[QueuedAction]) -> Result<()> {
        self.write_envelope(QUEUE_STORAGE_KEY, &actions, actions.len()).await?;
        Ok(())
    }

    async fn load_sync_status(&self) -> Result<Option<SyncStatusRecord>> {
        let Some(bytes) = self.read_verified(SYNC_STATUS_STORAGE_KEY).await? else {
            return Ok(None);
        };

        serde_json::from_slice::<Envelope<SyncStatusRecord>>(&bytes)
            .map(|envelope| Some(envelope.data))
            .map_err(|e| ChecksyncError::Storage(format!("unreadable sync status: {e}")))
    }

    async fn save_sync_status(&self, status: &SyncStatusRecord) -> Result<()> {
        self.write_envelope(SYNC_STATUS_STORAGE_KEY, status, 1).await?;
        Ok(())
    }
}

fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// The envelope's `item_count`, read straight from the raw bytes. It is
/// written before `data`, so it usually survives a truncated file.
fn recover_item_count(bytes: &[u8]) -> Option<usize> {
    const FIELD: &[u8] = b"\"item_count\":";
    let start = bytes.windows(FIELD.len()).position(|w| w == FIELD)? + FIELD.len();
    let digits: String = bytes[start..]
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take_while(|b| b.is_ascii_digit())
        .map(|&b| char::from(b))
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use checksync_domain::{ActionKind, ActionStatus, ActionId, Priority};
    use tempfile::TempDir;

    use super::*;

    fn action(task: &str, sequence: u64) -> QueuedAction {
        let kind = ActionKind::UndoTaskCompletion { task_id: task.into() };
        QueuedAction {
            id: ActionId::new(),
            target_entity_id: kind.target().clone(),
            kind,
            created_at: Utc::now(),
            sequence,
            priority: Priority::High,
            retry_count: 0,
            max_retries: 3,
            status: ActionStatus::Pending,
            last_error: None,
            last_attempt_at: None,
        }
    }

    /// Validates that a missing file reads as an empty queue.
    ///
    /// Assertions:
    /// - Confirms no records and no sync status before the first save.
    #[tokio::test]
    async fn test_missing_files_load_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileQueueStore::new(dir.path().join("nested"));

        assert_eq!(store.load_queue().await.unwrap(), LoadedQueue::default());
        assert!(store.load_sync_status().await.unwrap().is_none());
    }

    /// Validates the write path leaves a checksum that matches the data.
    ///
    /// Assertions:
    /// - Confirms the sidecar holds the SHA-256 of the data file.
    /// - Ensures no temp file is left behind.
    #[tokio::test]
    async fn test_save_writes_matching_checksum() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileQueueStore::new(dir.path());
        store.save_queue(&[action("T1", 0)]).await.unwrap();

        let data = std::fs::read(store.data_path(QUEUE_STORAGE_KEY)).unwrap();
        let sidecar = std::fs::read_to_string(store.checksum_path(QUEUE_STORAGE_KEY)).unwrap();
        assert_eq!(sidecar, checksum(&data));
        assert!(!store.data_path(QUEUE_STORAGE_KEY).with_extension("json.tmp").exists());
    }

    /// Validates quarantine of an unparseable queue file.
    ///
    /// Assertions:
    /// - Confirms the load succeeds empty but reports one lost record.
    /// - Confirms the bad file was moved aside.
    #[tokio::test]
    async fn test_unreadable_file_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileQueueStore::new(dir.path());
        std::fs::write(store.data_path(QUEUE_STORAGE_KEY), b"{ not json").unwrap();

        let loaded = store.load_queue().await.unwrap();
        assert!(loaded.records.is_empty());
        assert_eq!(loaded.unreadable, 1);
        assert!(!store.data_path(QUEUE_STORAGE_KEY).exists());
        let quarantined = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(std::result::Result::ok)
            .any(|entry| entry.file_name().to_string_lossy().contains("corrupt-"));
        assert!(quarantined);
    }

    /// Validates that a truncated file still reports how much was lost.
    ///
    /// Assertions:
    /// - Confirms the envelope's `item_count` is recovered from a cut file.
    /// - Confirms the queue load reports that many unreadable records.
    #[tokio::test]
    async fn test_truncated_file_reports_item_count() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileQueueStore::new(dir.path());
        let actions: Vec<_> = (0..3).map(|i| action("T", i)).collect();
        store.save_queue(&actions).await.unwrap();

        let path = store.data_path(QUEUE_STORAGE_KEY);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 20]).unwrap();

        assert_eq!(recover_item_count(&bytes), Some(3));
        assert_eq!(recover_item_count(b"{\"version\":1,\"data\":["), None);
        let loaded = store.load_queue().await.unwrap();
        assert!(loaded.records.is_empty());
        assert_eq!(loaded.unreadable, 3);
    }
}
