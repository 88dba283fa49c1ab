//! Durable mailbox between the background worker and a foreground window.
//!
//! The store holds at most one record, keyed by [`HANDOFF_ID`]. Writers replace
//! the record atomically (temp file + rename); readers claim it by renaming it
//! to a private file before reading, so a record is handed out at most once
//! even when several windows race on focus. No operation here returns an
//! error: failures are logged and read as "no record".

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

pub const HANDOFF_ID: &str = "order";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffRecord {
    pub id: String,
    pub payload: Value,
    /// Milliseconds since the Unix epoch.
    pub ts: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HandoffRead {
    Empty,
    Fresh(Value),
    Stale,
}

impl HandoffRead {
    pub fn label(&self) -> &'static str {
        match self {
            HandoffRead::Empty => "empty",
            HandoffRead::Fresh(_) => "fresh",
            HandoffRead::Stale => "stale",
        }
    }

    pub fn into_payload(self) -> Option<Value> {
        match self {
            HandoffRead::Fresh(payload) => Some(payload),
            HandoffRead::Empty | HandoffRead::Stale => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HandoffStore {
    dir: PathBuf,
    freshness: Duration,
}

impl HandoffStore {
    pub fn new(data_dir: &Path, store_name: &str, freshness: Duration) -> Self {
        Self {
            dir: data_dir.join(store_name).join("pending"),
            freshness,
        }
    }

    pub fn freshness(&self) -> Duration {
        self.freshness
    }

    /// Replaces any pending record with `payload`. Never fails.
    pub async fn write(&self, payload: Value) {
        self.write_at(payload, Utc::now()).await;
    }

    pub async fn write_at(&self, payload: Value, now: DateTime<Utc>) {
        let record = HandoffRecord {
            id: HANDOFF_ID.to_string(),
            payload,
            ts: now.timestamp_millis(),
        };

        match self.put(&record).await {
            Ok(()) => debug!(dir = %self.dir.display(), "handoff record written"),
            Err(err) => warn!(error = %err, "failed to write handoff record"),
        }
    }

    /// Takes the pending record, if any. The record is gone afterwards
    /// whether or not it was still fresh.
    pub async fn read_and_clear(&self) -> HandoffRead {
        self.read_and_clear_at(Utc::now()).await
    }

    pub async fn read_and_clear_at(&self, now: DateTime<Utc>) -> HandoffRead {
        let record = match self.claim().await {
            Ok(Some(record)) => record,
            Ok(None) => return HandoffRead::Empty,
            Err(err) => {
                warn!(error = %err, "failed to read handoff record");
                return HandoffRead::Empty;
            }
        };

        let age_ms = now.timestamp_millis().saturating_sub(record.ts);
        if age_ms < self.freshness.as_millis() as i64 {
            HandoffRead::Fresh(record.payload)
        } else {
            debug!(age_ms, "discarding stale handoff record");
            HandoffRead::Stale
        }
    }

    fn record_path(&self) -> PathBuf {
        self.dir.join(format!("{HANDOFF_ID}.json"))
    }

    async fn put(&self, record: &HandoffRecord) -> io::Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let bytes = serde_json::to_vec(record).map_err(io::Error::other)?;
        let temp_path = self.dir.join(format!("{HANDOFF_ID}.{}.tmp", Uuid::new_v4()));
        fs::write(&temp_path, bytes).await?;

        if let Err(err) = fs::rename(&temp_path, self.record_path()).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err);
        }
        Ok(())
    }

    async fn claim(&self) -> io::Result<Option<HandoffRecord>> {
        fs::create_dir_all(&self.dir).await?;

        let claim_path = self.dir.join(format!("{HANDOFF_ID}.{}.claim", Uuid::new_v4()));
        match fs::rename(self.record_path(), &claim_path).await {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        }

        let bytes = fs::read(&claim_path).await;
        if let Err(err) = fs::remove_file(&claim_path).await {
            warn!(error = %err, path = %claim_path.display(), "failed to remove claimed handoff record");
        }

        match serde_json::from_slice::<HandoffRecord>(&bytes?) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                warn!(error = %err, "discarding corrupt handoff record");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;

    use super::{HandoffRead, HandoffStore};

    fn store(dir: &tempfile::TempDir) -> HandoffStore {
        HandoffStore::new(dir.path(), "hamshirago", Duration::from_secs(300))
    }

    #[tokio::test]
    async fn empty_store_is_provisioned_and_reads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        assert_eq!(store.read_and_clear().await, HandoffRead::Empty);
        assert!(dir.path().join("hamshirago").join("pending").is_dir());
    }

    #[tokio::test]
    async fn fresh_record_is_returned_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.write(json!({ "orderId": "O1" })).await;

        let first = store.read_and_clear().await;
        let second = store.read_and_clear().await;

        assert_eq!(first, HandoffRead::Fresh(json!({ "orderId": "O1" })));
        assert_eq!(second, HandoffRead::Empty);
    }

    #[tokio::test]
    async fn stale_record_is_dropped_and_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let six_minutes_ago = Utc::now() - chrono::Duration::minutes(6);
        store.write_at(json!({ "orderId": "OLD" }), six_minutes_ago).await;

        assert_eq!(store.read_and_clear().await, HandoffRead::Stale);
        assert_eq!(store.read_and_clear().await, HandoffRead::Empty);
    }

    #[tokio::test]
    async fn newer_write_overwrites_older() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.write(json!({ "orderId": "A" })).await;
        store.write(json!({ "orderId": "B" })).await;

        let payload = store.read_and_clear().await.into_payload();
        assert_eq!(payload, Some(json!({ "orderId": "B" })));
    }

    #[tokio::test]
    async fn corrupt_record_reads_as_empty_and_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let pending = dir.path().join("hamshirago").join("pending");
        std::fs::create_dir_all(&pending).unwrap();
        std::fs::write(pending.join("order.json"), b"{not json").unwrap();

        assert_eq!(store.read_and_clear().await, HandoffRead::Empty);
        assert!(!pending.join("order.json").exists());
    }

    #[tokio::test]
    async fn concurrent_readers_get_the_record_at_most_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.write(json!({ "orderId": "RACE" })).await;

        let (a, b) = tokio::join!(store.read_and_clear(), store.read_and_clear());
        let delivered = [a, b]
            .into_iter()
            .filter(|read| matches!(read, HandoffRead::Fresh(_)))
            .count();

        assert_eq!(delivered, 1);
    }
}
