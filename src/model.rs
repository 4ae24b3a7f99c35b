//! Core data model.
//!
//! A message is one unit of work leased from a backend queue. Queues are
//! addressed by logical [`QueueKey`]s; per-entity exclusion is keyed by
//! [`LockKey`]s.

pub mod event;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use event::JobEvent;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A message delivered by a backend.
///
/// Created by the backend on pull. The worker never changes
/// `delivery_count`; backends bump it on redelivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Backend-assigned identifier.
    pub id: String,

    /// Opaque token passed back to `acknowledge`.
    pub ack_token: String,

    /// Raw body, usually JSON.
    pub payload: Vec<u8>,

    /// Number of prior deliveries of this message.
    pub delivery_count: u32,

    /// When the backend accepted the message, if it reports it.
    pub enqueued_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(id: impl Into<String>, ack_token: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            ack_token: ack_token.into(),
            payload,
            delivery_count: 0,
            enqueued_at: None,
        }
    }

    pub fn with_delivery_count(mut self, delivery_count: u32) -> Self {
        self.delivery_count = delivery_count;
        self
    }
}

// ---------------------------------------------------------------------------
// QueueKey
// ---------------------------------------------------------------------------

/// Logical queue name, resolved to a backend address through a `QueueMap`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueKey(String);

impl QueueKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for QueueKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for QueueKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl std::fmt::Display for QueueKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// LockKey
// ---------------------------------------------------------------------------

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// String key for a session-scoped advisory lock.
///
/// Locks are taken on a 64-bit FNV-1a hash of the key, so two distinct keys
/// can collide and exclude each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey(String);

impl LockKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key for an external entity, optionally narrowed to one job kind.
    pub fn for_entity(entity_id: &str, kind: Option<&str>) -> Self {
        match kind {
            Some(kind) => Self(format!("{entity_id}:{kind}")),
            None => Self(entity_id.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The advisory lock id this key maps to.
    pub fn lock_id(&self) -> i64 {
        let hash = self.0.bytes().fold(FNV_OFFSET, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
        });
        hash as i64
    }
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
