//! Domain events carried in job payloads.

use crate::error::Result;
use crate::model::{LockKey, Message};
use serde::{Deserialize, Serialize};

/// A job payload: something happened to an external entity in a domain.
///
/// `action` narrows the event within its domain; dispatch falls back to
/// domain-only handlers when no handler claims the exact action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub domain: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Identifier of the external entity this event is about.
    pub entity_id: String,

    /// Event-specific body. Not interpreted here.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl JobEvent {
    pub fn new(domain: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            action: None,
            entity_id: entity_id.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Decode the event from a message payload.
    pub fn decode(message: &Message) -> Result<Self> {
        Ok(serde_json::from_slice(&message.payload)?)
    }

    /// Lock key serializing work on this event's entity, optionally per kind.
    pub fn lock_key(&self, kind: Option<&str>) -> LockKey {
        LockKey::for_entity(&self.entity_id, kind)
    }
}
