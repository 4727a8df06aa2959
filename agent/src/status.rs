//! The observable sync status record.
//!
//! This snapshot is the only externally visible signal of sync health:
//! consumers poll it to show online/offline, pending-queue depth and the
//! last error. It lives in memory, is mutated by every cycle, and is
//! persisted best-effort to `sync-status.json` so a restart starts from a
//! truthful picture.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use crate::error::NetworkErrorClass;
use tillsync_engine::timestamp;

pub const STATUS_FILE: &str = "sync-status.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// True only when sync is configured, the last pull succeeded, and it
    /// happened within twice the pull interval.
    pub online: bool,
    pub last_pull_at: Option<String>,
    pub last_pull_error: Option<String>,
    pub last_pull_error_class: Option<NetworkErrorClass>,
    pub last_push_at: Option<String>,
    pub last_push_error: Option<String>,
    pub queue_remaining: usize,
    pub last_new_orders_at: Option<String>,
    pub last_new_orders_count: usize,
}

impl SyncStatus {
    pub fn record_pull_ok(&mut self, at: &str) {
        self.last_pull_at = Some(at.to_string());
        self.last_pull_error = None;
        self.last_pull_error_class = None;
    }

    pub fn record_pull_error(&mut self, message: String, class: Option<NetworkErrorClass>) {
        self.last_pull_error = Some(message);
        self.last_pull_error_class = class;
    }

    pub fn record_push_ok(&mut self, at: &str) {
        self.last_push_at = Some(at.to_string());
        self.last_push_error = None;
    }

    pub fn record_push_error(&mut self, message: impl Into<String>) {
        self.last_push_error = Some(message.into());
    }

    pub fn record_new_orders(&mut self, at: &str, count: usize) {
        self.last_new_orders_at = Some(at.to_string());
        self.last_new_orders_count = count;
    }

    /// Recompute the `online` flag from the pull bookkeeping.
    pub fn update_online(&mut self, configured: bool, pull_interval: Duration) {
        self.online = configured
            && self.last_pull_error.is_none()
            && self
                .last_pull_at
                .as_deref()
                .and_then(timestamp::parse)
                .map(|last| {
                    let age = Utc::now().signed_duration_since(last);
                    age.num_milliseconds() >= 0
                        && age.num_milliseconds() as u128 <= 2 * pull_interval.as_millis()
                })
                .unwrap_or(false);
    }

    /// Best-effort persistence of the snapshot.
    pub async fn persist(&self, data_dir: &Path) {
        let json = match serde_json::to_vec_pretty(self) {
            Ok(json) => json,
            Err(err) => {
                warn!(%err, "sync status not serializable");
                return;
            }
        };
        if let Err(err) = fs::write(data_dir.join(STATUS_FILE), json).await {
            warn!(%err, "sync status not persisted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::now_iso;

    #[test]
    fn online_requires_recent_successful_pull() {
        let interval = Duration::from_secs(3);
        let mut status = SyncStatus::default();

        status.update_online(true, interval);
        assert!(!status.online, "no pull yet");

        status.record_pull_ok(&now_iso());
        status.update_online(true, interval);
        assert!(status.online);

        status.update_online(false, interval);
        assert!(!status.online, "sync not configured");

        status.record_pull_error("HTTP 500".into(), None);
        status.update_online(true, interval);
        assert!(!status.online, "last pull errored");
    }

    #[test]
    fn online_expires_after_twice_the_interval() {
        let mut status = SyncStatus::default();
        let stale = (Utc::now() - chrono::Duration::seconds(10)).to_rfc3339();
        status.record_pull_ok(&stale);

        status.update_online(true, Duration::from_secs(3));
        assert!(!status.online);

        status.update_online(true, Duration::from_secs(6));
        assert!(status.online);
    }

    #[test]
    fn unparsable_pull_timestamp_means_offline() {
        let mut status = SyncStatus::default();
        status.last_pull_at = Some("garbage".into());
        status.update_online(true, Duration::from_secs(3));
        assert!(!status.online);
    }

    #[test]
    fn wire_shape_is_camel_case() {
        let mut status = SyncStatus::default();
        status.record_pull_error("HTTP 500".into(), Some(NetworkErrorClass::Refused));
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["lastPullError"], "HTTP 500");
        assert_eq!(value["lastPullErrorClass"], "refused");
        assert_eq!(value["queueRemaining"], 0);
    }
}
