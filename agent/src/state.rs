//! Persisted per-collection sync cursors.
//!
//! `sync-state.json` records when each collection last completed a pull.
//! The timestamp doubles as the `since` cursor for delta pulls; a
//! collection without one is on its initial sync and gets a full
//! snapshot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

pub const STATE_FILE: &str = "sync-state.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    #[serde(default)]
    pub last_sync_by_collection: BTreeMap<String, String>,
}

impl SyncState {
    /// Load the state file; any problem reading it means starting over
    /// with full pulls, never failing.
    pub async fn load(data_dir: &Path) -> Self {
        match fs::read_to_string(Self::path(data_dir)).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(%err, "sync state unreadable; starting with full pulls");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Best-effort save; an unsaved cursor only costs a wider pull later.
    pub async fn save(&self, data_dir: &Path) {
        let json = match serde_json::to_vec_pretty(self) {
            Ok(json) => json,
            Err(err) => {
                warn!(%err, "sync state not serializable");
                return;
            }
        };
        let _ = fs::create_dir_all(data_dir).await;
        if let Err(err) = fs::write(Self::path(data_dir), json).await {
            warn!(%err, "sync state not persisted");
        }
    }

    fn path(data_dir: &Path) -> PathBuf {
        data_dir.join(STATE_FILE)
    }

    pub fn since(&self, collection: &str) -> Option<&str> {
        self.last_sync_by_collection
            .get(collection)
            .map(String::as_str)
    }

    pub fn record(&mut self, collection: &str, at: &str) {
        self.last_sync_by_collection
            .insert(collection.to_string(), at.to_string());
    }
}
