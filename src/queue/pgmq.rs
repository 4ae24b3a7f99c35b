//! Postgres subscriber backed by the pgmq extension.
//!
//! Queue keys resolve to pgmq queue names. pgmq counts every read of a
//! message (`read_ct`), so the delivery count is `read_ct - 1`. Supports a
//! native long-poll through `pgmq.read_with_poll`.

use super::{PullWaiter, QueueMap, Subscriber, effective_visibility_timeout};
use crate::cancel::Cancellation;
use crate::db::Db;
use crate::db::pgmq::PgmqMessage;
use crate::error::{Error, Result};
use crate::model::{Message, QueueKey};
use async_trait::async_trait;
use tracing::{debug, error};

#[derive(Debug, Clone)]
pub struct PgmqOptions {
    /// Seconds a read message stays hidden. Non-positive means 30.
    pub visibility_timeout_secs: i32,
    /// Server-side wait bound for each long-poll round.
    pub poll_seconds: i32,
    /// How often pgmq rechecks the queue during a long-poll round.
    pub poll_interval_ms: i32,
    /// Archive acknowledged messages instead of deleting them.
    pub archive_on_ack: bool,
}

impl Default for PgmqOptions {
    fn default() -> Self {
        Self {
            visibility_timeout_secs: 30,
            poll_seconds: 5,
            poll_interval_ms: 100,
            archive_on_ack: false,
        }
    }
}

pub struct PgmqSubscriber {
    db: Db,
    queues: QueueMap,
    options: PgmqOptions,
}

impl PgmqSubscriber {
    pub fn new(db: Db, queues: QueueMap, options: PgmqOptions) -> Self {
        Self {
            db,
            queues,
            options,
        }
    }

    fn queue_name(&self, key: &QueueKey) -> Result<&str> {
        self.queues.resolve(key).inspect_err(|e| {
            error!(queue = %key, error = %e, "queue key has no pgmq queue");
        })
    }

    fn visibility_timeout(&self) -> i32 {
        effective_visibility_timeout(self.options.visibility_timeout_secs)
    }
}

/// pgmq `qty` for a request of `max_count`; `None` when nothing was asked for.
fn batch_size(max_count: usize) -> Option<i32> {
    match max_count {
        0 => None,
        n => Some(i32::try_from(n).unwrap_or(i32::MAX)),
    }
}

fn to_message(row: PgmqMessage) -> Result<Message> {
    let id = row.msg_id.to_string();
    Ok(Message {
        ack_token: id.clone(),
        id,
        payload: serde_json::to_vec(&row.message)?,
        delivery_count: u32::try_from(row.read_ct.saturating_sub(1)).unwrap_or(0),
        enqueued_at: Some(row.enqueued_at),
    })
}

#[async_trait]
impl Subscriber for PgmqSubscriber {
    async fn pull(&self, queue: &QueueKey, max_count: usize) -> Result<Vec<Message>> {
        let name = self.queue_name(queue)?;
        let Some(qty) = batch_size(max_count) else {
            return Ok(Vec::new());
        };
        self.db
            .read_batch(name, self.visibility_timeout(), qty)
            .await?
            .into_iter()
            .map(to_message)
            .collect()
    }

    async fn acknowledge(&self, queue: &QueueKey, ack_token: &str) -> Result<()> {
        let name = self.queue_name(queue)?;
        let msg_id: i64 = ack_token
            .parse()
            .map_err(|_| Error::InvalidAckToken(ack_token.to_string()))?;
        if self.options.archive_on_ack {
            self.db.archive_message(name, msg_id).await
        } else {
            self.db.delete_message(name, msg_id).await
        }
    }

    fn as_pull_waiter(&self) -> Option<&dyn PullWaiter> {
        Some(self)
    }
}

#[async_trait]
impl PullWaiter for PgmqSubscriber {
    async fn pull_wait(
        &self,
        cancel: &Cancellation,
        queue: &QueueKey,
        max_count: usize,
    ) -> Result<Vec<Message>> {
        let name = self.queue_name(queue)?;
        let qty = batch_size(max_count.max(1)).unwrap_or(1);
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let rows = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                rows = self.db.read_with_poll(
                    name,
                    self.visibility_timeout(),
                    qty,
                    self.options.poll_seconds.max(1),
                    self.options.poll_interval_ms.max(10),
                ) => rows?,
            };
            if !rows.is_empty() {
                return rows.into_iter().map(to_message).collect();
            }
            debug!(queue = %queue, "long-poll round returned nothing");
        }
    }
}
