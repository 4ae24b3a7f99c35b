//! Backend-agnostic message pull contract.
//!
//! A [`Subscriber`] leases messages from a backend and deletes them on
//! acknowledgment. Backends with a native long-poll also expose
//! [`PullWaiter`] through [`Subscriber::as_pull_waiter`]; [`pull_wait`] uses
//! it when present and falls back to re-pulling otherwise.

pub mod memory;
pub mod pgmq;
pub mod sqs;

use crate::cancel::Cancellation;
use crate::error::{Error, Result};
use crate::model::{Message, QueueKey};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

pub use memory::MemorySubscriber;
pub use pgmq::PgmqSubscriber;
pub use sqs::SqsSubscriber;

/// Pull/acknowledge access to a queue backend.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Lease up to `max_count` messages. May return fewer than are available,
    /// including none. Must not block indefinitely.
    async fn pull(&self, queue: &QueueKey, max_count: usize) -> Result<Vec<Message>>;

    /// Delete one leased message. Idempotence is backend-defined.
    async fn acknowledge(&self, queue: &QueueKey, ack_token: &str) -> Result<()>;

    /// The backend's native blocking receive, if it has one.
    fn as_pull_waiter(&self) -> Option<&dyn PullWaiter> {
        None
    }
}

/// Backend-native long-poll.
#[async_trait]
pub trait PullWaiter: Send + Sync {
    /// Block until at least one message is leased, an error occurs, or
    /// `cancel` fires.
    async fn pull_wait(
        &self,
        cancel: &Cancellation,
        queue: &QueueKey,
        max_count: usize,
    ) -> Result<Vec<Message>>;
}

/// Wait for the next non-empty batch from `queue`.
///
/// A `max_count` of zero is treated as one. Delegates to the subscriber's
/// [`PullWaiter`] when it has one and returns its result untouched. Otherwise
/// pulls repeatedly, checking `cancel` before each pull, until a pull returns
/// messages or fails. Empty pulls are retried immediately with no delay.
pub async fn pull_wait(
    subscriber: &dyn Subscriber,
    cancel: &Cancellation,
    queue: &QueueKey,
    max_count: usize,
) -> Result<Vec<Message>> {
    let max_count = max_count.max(1);

    if let Some(waiter) = subscriber.as_pull_waiter() {
        return waiter.pull_wait(cancel, queue, max_count).await;
    }

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let messages = subscriber.pull(queue, max_count).await?;
        if !messages.is_empty() {
            return Ok(messages);
        }
        // Busy-polls a backend without long-poll support.
        tokio::task::yield_now().await;
    }
}

/// Static mapping from logical queue keys to backend addresses
/// (SQS queue URLs, pgmq queue names).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct QueueMap(BTreeMap<QueueKey, String>);

impl QueueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<QueueKey>, address: impl Into<String>) {
        self.0.insert(key.into(), address.into());
    }

    /// Backend address for `key`. An unmapped key is a fatal configuration
    /// error, never a retryable one.
    pub fn resolve(&self, key: &QueueKey) -> Result<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| Error::UnmappedQueue(key.clone()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &QueueKey> {
        self.0.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<QueueKey>, V: Into<String>> FromIterator<(K, V)> for QueueMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Visibility timeout used when the configured one is not positive.
pub const DEFAULT_VISIBILITY_TIMEOUT_SECS: i32 = 30;

/// Normalize a configured visibility timeout.
pub fn effective_visibility_timeout(configured_secs: i32) -> i32 {
    if configured_secs <= 0 {
        DEFAULT_VISIBILITY_TIMEOUT_SECS
    } else {
        configured_secs
    }
}
