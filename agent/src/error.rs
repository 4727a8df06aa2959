//! Error taxonomy for the agent.
//!
//! Three layers, matching how faults propagate:
//!
//! - [`StoreError`]: file-level faults. Corruption is *not* among them:
//!   a corrupt collection file is quarantined and replaced with the
//!   default, never surfaced to callers.
//! - [`RemoteError`]: one HTTP exchange, carrying a
//!   [`NetworkErrorClass`] so the controller can pick a retry strategy.
//! - [`SyncError`]: umbrella for a sync cycle; recorded in the status and
//!   aborts only the current cycle.

use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use thiserror::Error;

/// Coarse classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkErrorClass {
    Dns,
    Refused,
    Timeout,
    Reset,
    Unknown,
}

impl std::fmt::Display for NetworkErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Dns => "dns",
            Self::Refused => "refused",
            Self::Timeout => "timeout",
            Self::Reset => "reset",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Classify a `reqwest` failure by walking its source chain.
///
/// DNS resolution failures do not surface a dedicated error kind, so they
/// are recognized by the resolver's message text.
pub fn classify(err: &reqwest::Error) -> NetworkErrorClass {
    if err.is_timeout() {
        return NetworkErrorClass::Timeout;
    }

    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => return NetworkErrorClass::Refused,
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe => {
                    return NetworkErrorClass::Reset
                }
                std::io::ErrorKind::TimedOut => return NetworkErrorClass::Timeout,
                _ => {}
            }
        }
        let text = cause.to_string();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return NetworkErrorClass::Dns;
        }
        source = cause.source();
    }

    NetworkErrorClass::Unknown
}

/// File-level store faults.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tillsync_engine::Error> for StoreError {
    fn from(err: tillsync_engine::Error) -> Self {
        match err {
            tillsync_engine::Error::ItemNotFound(id) => StoreError::ItemNotFound(id),
        }
    }
}

/// One failed HTTP exchange with the remote.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request timed out")]
    Timeout,

    #[error("network error ({class}): {message}")]
    Transport {
        class: NetworkErrorClass,
        message: String,
    },

    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        match classify(&err) {
            NetworkErrorClass::Timeout => RemoteError::Timeout,
            class => RemoteError::Transport {
                class,
                message: err.to_string(),
            },
        }
    }

    /// The network class, for retry decisions. Application-level failures
    /// (non-2xx, undecodable bodies) are `Unknown`.
    pub fn class(&self) -> NetworkErrorClass {
        match self {
            RemoteError::Timeout => NetworkErrorClass::Timeout,
            RemoteError::Transport { class, .. } => *class,
            RemoteError::Status { .. } | RemoteError::Decode(_) => NetworkErrorClass::Unknown,
        }
    }
}

/// Anything that can abort a sync cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl SyncError {
    pub fn network_class(&self) -> Option<NetworkErrorClass> {
        match self {
            SyncError::Remote(err) => Some(err.class()),
            SyncError::Store(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_display_matches_wire_names() {
        assert_eq!(NetworkErrorClass::Dns.to_string(), "dns");
        assert_eq!(NetworkErrorClass::Refused.to_string(), "refused");
        assert_eq!(
            serde_json::to_string(&NetworkErrorClass::Timeout).unwrap(),
            "\"timeout\""
        );
    }

    #[test]
    fn status_errors_have_no_network_class() {
        let err = SyncError::Remote(RemoteError::Status { status: 500 });
        assert_eq!(err.network_class(), Some(NetworkErrorClass::Unknown));

        let err = SyncError::Store(StoreError::UnknownCollection("x".into()));
        assert_eq!(err.network_class(), None);
    }

    #[test]
    fn item_not_found_converts_from_engine() {
        let err: StoreError = tillsync_engine::Error::ItemNotFound("o1".into()).into();
        assert!(matches!(err, StoreError::ItemNotFound(id) if id == "o1"));
    }
}
