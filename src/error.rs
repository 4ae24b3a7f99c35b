//! Error types for jobq.

use crate::model::QueueKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("sqs error: {0}")]
    Sqs(String),

    #[error("bad payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    /// No address is configured for the queue key. Never retried.
    #[error("no queue address configured for key {0}")]
    UnmappedQueue(QueueKey),

    #[error("invalid ack token: {0}")]
    InvalidAckToken(String),

    /// The advisory lock for the key is held by another session.
    #[error("lock not held: {0}")]
    LockNotHeld(String),

    #[error("no handler for {domain}/{}", action.as_deref().unwrap_or("*"))]
    Unroutable {
        domain: String,
        action: Option<String>,
    },

    #[error("hook failed: {0}")]
    Hook(String),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Configuration errors stop the worker instead of entering backoff.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::UnmappedQueue(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configuration_errors_are_fatal() {
        assert!(Error::UnmappedQueue(QueueKey::from("billing")).is_fatal());
        assert!(Error::Config("bad".into()).is_fatal());
        assert!(!Error::LockNotHeld("team:1".into()).is_fatal());
        assert!(!Error::Sqs("throttled".into()).is_fatal());
        assert!(!Error::Cancelled.is_fatal());
    }

    #[test]
    fn unroutable_renders_wildcard_action() {
        let err = Error::Unroutable {
            domain: "team".into(),
            action: None,
        };
        assert_eq!(err.to_string(), "no handler for team/*");
    }
}
