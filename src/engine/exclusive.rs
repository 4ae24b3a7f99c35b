//! Per-entity mutual exclusion for event handlers.

use super::handler::EventHandler;
use crate::db::Db;
use crate::db::lock::LockScope;
use crate::error::{Error, Result};
use crate::model::{JobEvent, Message};
use crate::telemetry::metrics;
use async_trait::async_trait;
use opentelemetry::KeyValue;
use tracing::info;

/// Runs the wrapped handler only while holding the advisory lock for the
/// event's entity, so at most one worker (in any process) progresses that
/// entity at a time.
///
/// A busy lock fails the job with [`Error::LockNotHeld`]; the worker treats
/// it like any handler failure and the message is redelivered later.
pub struct Exclusive<H, L = Db> {
    locks: L,
    kind: Option<String>,
    inner: H,
}

impl<H: EventHandler, L: LockScope> Exclusive<H, L> {
    pub fn new(locks: L, inner: H) -> Self {
        Self {
            locks,
            kind: None,
            inner,
        }
    }

    /// Lock per (entity, kind) instead of per entity.
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

#[async_trait]
impl<H: EventHandler, L: LockScope> EventHandler for Exclusive<H, L> {
    async fn handle_event(&self, event: &JobEvent, message: &Message) -> Result<()> {
        let key = event.lock_key(self.kind.as_deref());
        let result = self
            .locks
            .locked(&key, self.inner.handle_event(event, message))
            .await;

        if let Err(Error::LockNotHeld(_)) = &result {
            metrics::lock_contention().add(1, &[KeyValue::new("domain", event.domain.clone())]);
            info!(lock = %key, message_id = %message.id, "entity busy in another worker");
        }
        result
    }
}
