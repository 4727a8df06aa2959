//! Thin HTTP transport to the remote sync service.
//!
//! One endpoint pair per collection:
//!
//! - `GET /sync/collection/{name}[?since=ISO8601]` → delta or full payload
//! - `POST /sync/collection/{name}` with a [`PushPayload`] body
//!
//! Every request carries the static `x-sync-token` header when configured
//! and is bounded by the configured timeout; a fired timeout surfaces as a
//! distinguished [`RemoteError::Timeout`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use tillsync_engine::{Item, Meta, Tombstone};

use crate::config::Config;
use crate::error::RemoteError;

const SYNC_TOKEN_HEADER: &str = "x-sync-token";

/// Body of a push request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum PushPayload {
    /// Replace the remote collection with a full document.
    Full { data: Value },
    /// Send changed items and tombstones only.
    Delta { items: Vec<Item>, meta: Meta },
}

impl PushPayload {
    pub fn full(data: Value) -> Self {
        Self::Full { data }
    }

    pub fn delta(items: Vec<Item>, deleted: Vec<Tombstone>) -> Self {
        Self::Delta {
            items,
            meta: Meta { deleted },
        }
    }
}

/// HTTP client for the sync endpoints.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RemoteClient {
    /// Build a client from config; `None` when no base URL is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let base_url = config.base_url.clone()?;
        let http = match reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
        {
            Ok(http) => http,
            Err(err) => {
                tracing::warn!(%err, "http client could not be built; sync disabled");
                return None;
            }
        };
        Some(Self {
            http,
            base_url,
            token: config.token.clone(),
        })
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/sync/collection/{collection}", self.base_url)
    }

    /// Pull a collection, optionally asking for changes since a timestamp.
    /// The payload shape (delta vs full) is decided by the server.
    pub async fn pull(
        &self,
        collection: &str,
        since: Option<&str>,
    ) -> Result<Value, RemoteError> {
        let mut request = self
            .http
            .get(self.collection_url(collection))
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(since) = since {
            request = request.query(&[("since", since)]);
        }
        if let Some(token) = &self.token {
            request = request.header(SYNC_TOKEN_HEADER, token);
        }

        let response = request.send().await.map_err(RemoteError::from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
            });
        }

        debug!(collection, since, "pulled collection");
        response
            .json()
            .await
            .map_err(|err| RemoteError::Decode(err.to_string()))
    }

    /// Push a payload to a collection.
    pub async fn push(&self, collection: &str, payload: &PushPayload) -> Result<(), RemoteError> {
        let mut request = self.http.post(self.collection_url(collection)).json(payload);
        if let Some(token) = &self.token {
            request = request.header(SYNC_TOKEN_HEADER, token);
        }

        let response = request.send().await.map_err(RemoteError::from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
            });
        }

        debug!(collection, "pushed collection payload");
        Ok(())
    }
}
