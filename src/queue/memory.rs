//! In-process leasing queue for local runs and tests.

use super::Subscriber;
use crate::error::{Error, Result};
use crate::model::{Message, QueueKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct Stored {
    id: u64,
    payload: Vec<u8>,
    delivery_count: u32,
    enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Queues {
    next_id: u64,
    next_lease: u64,
    ready: HashMap<QueueKey, VecDeque<Stored>>,
    /// Leased messages keyed by ack token.
    leased: HashMap<QueueKey, HashMap<String, Stored>>,
}

/// Leasing in-memory queue.
///
/// Pulled messages stay leased until acknowledged. Leases never lapse on
/// their own; call [`expire_leases`](Self::expire_leases) to make every
/// unacknowledged message deliverable again, as a visibility timeout would.
#[derive(Debug, Default)]
pub struct MemorySubscriber {
    queues: Mutex<Queues>,
}

impl MemorySubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Queues>> {
        self.queues
            .lock()
            .map_err(|_| Error::Other("memory queue mutex poisoned".to_string()))
    }

    /// Enqueue a payload. Returns the message id.
    pub fn push(&self, queue: &QueueKey, payload: impl Into<Vec<u8>>) -> Result<String> {
        let mut queues = self.lock()?;
        queues.next_id += 1;
        let stored = Stored {
            id: queues.next_id,
            payload: payload.into(),
            delivery_count: 0,
            enqueued_at: Utc::now(),
        };
        let id = stored.id.to_string();
        queues.ready.entry(queue.clone()).or_default().push_back(stored);
        Ok(id)
    }

    /// Return every leased message to its queue with one more delivery.
    pub fn expire_leases(&self) -> Result<usize> {
        let mut queues = self.lock()?;
        let leased = std::mem::take(&mut queues.leased);
        let mut expired = 0;
        for (queue, leases) in leased {
            let mut stored: Vec<Stored> = leases.into_values().collect();
            stored.sort_by_key(|s| s.id);
            let ready = queues.ready.entry(queue).or_default();
            for mut s in stored {
                s.delivery_count += 1;
                ready.push_back(s);
                expired += 1;
            }
        }
        Ok(expired)
    }

    /// Messages waiting to be pulled.
    pub fn pending(&self, queue: &QueueKey) -> Result<usize> {
        Ok(self.lock()?.ready.get(queue).map_or(0, VecDeque::len))
    }

    /// Messages pulled but not yet acknowledged.
    pub fn in_flight(&self, queue: &QueueKey) -> Result<usize> {
        Ok(self.lock()?.leased.get(queue).map_or(0, HashMap::len))
    }
}

#[async_trait]
impl Subscriber for MemorySubscriber {
    async fn pull(&self, queue: &QueueKey, max_count: usize) -> Result<Vec<Message>> {
        let mut queues = self.lock()?;
        let Queues {
            next_lease,
            ready,
            leased,
            ..
        } = &mut *queues;

        let Some(ready) = ready.get_mut(queue) else {
            return Ok(Vec::new());
        };
        let take = max_count.min(ready.len());
        let leases = leased.entry(queue.clone()).or_default();

        let mut messages = Vec::with_capacity(take);
        for stored in ready.drain(..take) {
            *next_lease += 1;
            let token = format!("{}.{}", stored.id, next_lease);
            messages.push(Message {
                id: stored.id.to_string(),
                ack_token: token.clone(),
                payload: stored.payload.clone(),
                delivery_count: stored.delivery_count,
                enqueued_at: Some(stored.enqueued_at),
            });
            leases.insert(token, stored);
        }
        Ok(messages)
    }

    async fn acknowledge(&self, queue: &QueueKey, ack_token: &str) -> Result<()> {
        let mut queues = self.lock()?;
        if let Some(leases) = queues.leased.get_mut(queue) {
            leases.remove(ack_token);
        }
        Ok(())
    }
}
