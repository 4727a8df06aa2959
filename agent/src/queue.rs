//! The outbound sync queue.
//!
//! Payloads that failed to reach the remote are parked here and replayed
//! opportunistically at the start of every cycle. The queue is a bounded,
//! best-effort retry buffer persisted as `sync-queue.json`, not a
//! guaranteed-delivery log: past capacity the oldest entries are dropped
//! (and the drop is reported so callers can surface it).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use crate::collections;
use crate::remote::{PushPayload, RemoteClient};
use crate::store::now_iso;

pub const QUEUE_FILE: &str = "sync-queue.json";

/// One parked payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueEntry {
    pub collection: String,
    pub payload: PushPayload,
    pub created_at: String,
}

/// Outcome of a flush pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    /// Entries delivered this pass.
    pub flushed: usize,
    /// Entries still parked (delivery stopped at the first failure).
    pub remaining: usize,
    /// Whether the pass stopped on a failed send.
    pub failed: bool,
}

/// Bounded FIFO of outbound payloads, persisted after every mutation.
#[derive(Debug)]
pub struct SyncQueue {
    path: PathBuf,
    max: usize,
    entries: Vec<SyncQueueEntry>,
}

impl SyncQueue {
    /// Load the queue file, dropping entries for collections that are no
    /// longer eligible for sync.
    pub async fn load(data_dir: &Path, max: usize) -> Self {
        let path = data_dir.join(QUEUE_FILE);
        let entries = match fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<Vec<SyncQueueEntry>>(&raw) {
                Ok(entries) => entries
                    .into_iter()
                    .filter(|entry| collections::is_synced(&entry.collection))
                    .collect(),
                Err(err) => {
                    warn!(%err, "sync queue file unreadable; starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Self { path, max, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a payload. Returns how many entries were dropped from the
    /// front to stay within capacity.
    pub async fn enqueue(&mut self, collection: &str, payload: PushPayload) -> usize {
        self.entries.push(SyncQueueEntry {
            collection: collection.to_string(),
            payload,
            created_at: now_iso(),
        });

        let dropped = self.entries.len().saturating_sub(self.max);
        if dropped > 0 {
            self.entries.drain(..dropped);
            warn!(dropped, collection, "sync queue overflow; oldest entries dropped");
        }

        self.persist().await;
        dropped
    }

    /// Replay entries strictly in FIFO order, stopping at the first
    /// failure so ordering is preserved for the next attempt.
    pub async fn flush(&mut self, remote: &RemoteClient) -> FlushReport {
        let mut report = FlushReport::default();

        while !self.entries.is_empty() {
            let entry = self.entries[0].clone();
            match remote.push(&entry.collection, &entry.payload).await {
                Ok(()) => {
                    self.entries.remove(0);
                    report.flushed += 1;
                }
                Err(err) => {
                    warn!(collection = %entry.collection, %err, "queue flush stopped");
                    report.failed = true;
                    break;
                }
            }
        }

        report.remaining = self.entries.len();
        if report.flushed > 0 || report.failed {
            self.persist().await;
        }
        report
    }

    /// Best-effort persistence; a failed write costs at most a replay of
    /// already-sent entries.
    async fn persist(&self) {
        let json = match serde_json::to_vec_pretty(&self.entries) {
            Ok(json) => json,
            Err(err) => {
                warn!(%err, "sync queue not serializable");
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent).await;
        }
        if let Err(err) = fs::write(&self.path, json).await {
            warn!(%err, "sync queue not persisted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn payload(tag: u32) -> PushPayload {
        PushPayload::full(json!({"items": [{"id": tag.to_string()}]}))
    }

    #[tokio::test]
    async fn capacity_keeps_the_newest_entries() {
        let dir = TempDir::new().unwrap();
        let mut queue = SyncQueue::load(dir.path(), 3).await;

        let mut dropped_total = 0;
        for tag in 0..5 {
            dropped_total += queue.enqueue("orders", payload(tag)).await;
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(dropped_total, 2);
        assert_eq!(queue.entries[0].payload, payload(2));
        assert_eq!(queue.entries[2].payload, payload(4));
    }

    #[tokio::test]
    async fn queue_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        {
            let mut queue = SyncQueue::load(dir.path(), 10).await;
            queue.enqueue("orders", payload(1)).await;
            queue.enqueue("products", payload(2)).await;
        }

        let reloaded = SyncQueue::load(dir.path(), 10).await;
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.entries[0].collection, "orders");
    }

    #[tokio::test]
    async fn load_drops_unsynced_collections() {
        let dir = TempDir::new().unwrap();
        let raw = json!([
            {"collection": "orders", "payload": {"mode": "full", "data": {}}, "createdAt": "2024-01-01T00:00:00Z"},
            {"collection": "dashboard", "payload": {"mode": "full", "data": {}}, "createdAt": "2024-01-01T00:00:00Z"}
        ]);
        std::fs::write(dir.path().join(QUEUE_FILE), raw.to_string()).unwrap();

        let queue = SyncQueue::load(dir.path(), 10).await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.entries[0].collection, "orders");
    }

    #[tokio::test]
    async fn unreadable_queue_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(QUEUE_FILE), "][").unwrap();

        let queue = SyncQueue::load(dir.path(), 10).await;
        assert!(queue.is_empty());
    }
}
