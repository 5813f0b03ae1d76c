//! Error taxonomy for the relay.

use std::time::Duration;
use thiserror::Error;

/// Failure fetching items from the source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network error, timeout, rate limit or server error. Safe to retry.
    #[error("transient source error: {reason}")]
    Transient {
        reason: String,
        retry_after: Option<Duration>,
    },

    /// Rejected request or undecodable response. Retrying will not help.
    #[error("source error: {0}")]
    Permanent(String),
}

/// Failure posting a message to the sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("transient sink error: {reason}")]
    Transient {
        reason: String,
        retry_after: Option<Duration>,
    },

    /// Malformed or oversized payload, unknown channel.
    #[error("sink rejected message: {0}")]
    Permanent(String),

    /// Credentials rejected (401/403).
    #[error("sink rejected credentials: {0}")]
    Unauthorized(String),
}

impl SinkError {
    pub fn transient(reason: impl Into<String>) -> Self {
        SinkError::Transient {
            reason: reason.into(),
            retry_after: None,
        }
    }
}

impl SourceError {
    pub fn transient(reason: impl Into<String>) -> Self {
        SourceError::Transient {
            reason: reason.into(),
            retry_after: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("cursor store I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cursor file {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level errors surfaced by the relay loop.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Missing or invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("source unavailable after retries: {0}")]
    TransientSource(String),

    /// The source rejected the request; retried next cycle.
    #[error("source rejected request: {0}")]
    Source(String),

    #[error("sink unavailable after retries: {0}")]
    TransientSink(String),

    /// Item could not be delivered and was skipped.
    #[error("permanent delivery failure for item {item_id}: {reason}")]
    PermanentDelivery { item_id: String, reason: String },

    /// Cursor store unavailable. Halts the loop.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl RelayError {
    /// Whether the poll loop must stop instead of waiting for the next cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::Config(_) | RelayError::Persistence(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_is_fatal() {
        let err = RelayError::from(PersistenceError::Io {
            path: "cache/x.json".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        });
        assert!(err.is_fatal());
        assert!(err.to_string().contains("cache/x.json"));
    }

    #[test]
    fn test_item_failures_are_not_fatal() {
        let err = RelayError::PermanentDelivery {
            item_id: "6".to_string(),
            reason: "oversized".to_string(),
        };
        assert!(!err.is_fatal());
        assert!(!RelayError::TransientSource("timeout".to_string()).is_fatal());
        assert!(!RelayError::Unauthorized("401".to_string()).is_fatal());
    }
}
