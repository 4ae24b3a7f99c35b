//! Blocking pull orchestration over subscribers with and without long-poll.

use async_trait::async_trait;
use jobq::cancel::Cancellation;
use jobq::error::{Error, Result};
use jobq::model::{Message, QueueKey};
use jobq::queue::{MemorySubscriber, PullWaiter, Subscriber, pull_wait};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

fn msg(id: &str) -> Message {
    Message::new(id, format!("tok-{id}"), id.as_bytes().to_vec())
}

/// Plain subscriber replaying scripted pull results.
struct Scripted {
    pulls: Mutex<VecDeque<Result<Vec<Message>>>>,
    pull_calls: AtomicUsize,
    last_max: AtomicUsize,
}

impl Scripted {
    fn new(script: Vec<Result<Vec<Message>>>) -> Self {
        Self {
            pulls: Mutex::new(script.into()),
            pull_calls: AtomicUsize::new(0),
            last_max: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Subscriber for Scripted {
    async fn pull(&self, _queue: &QueueKey, max_count: usize) -> Result<Vec<Message>> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        self.last_max.store(max_count, Ordering::SeqCst);
        self.pulls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn acknowledge(&self, _queue: &QueueKey, _ack_token: &str) -> Result<()> {
        Ok(())
    }
}

/// Subscriber with a native long-poll; plain pulls must never be used.
struct LongPolling {
    pull_calls: AtomicUsize,
    wait_calls: AtomicUsize,
}

#[async_trait]
impl Subscriber for LongPolling {
    async fn pull(&self, _queue: &QueueKey, _max_count: usize) -> Result<Vec<Message>> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![msg("from-pull")])
    }

    async fn acknowledge(&self, _queue: &QueueKey, _ack_token: &str) -> Result<()> {
        Ok(())
    }

    fn as_pull_waiter(&self) -> Option<&dyn PullWaiter> {
        Some(self)
    }
}

#[async_trait]
impl PullWaiter for LongPolling {
    async fn pull_wait(
        &self,
        _cancel: &Cancellation,
        _queue: &QueueKey,
        max_count: usize,
    ) -> Result<Vec<Message>> {
        self.wait_calls.fetch_add(1, Ordering::SeqCst);
        Ok((0..max_count).map(|i| msg(&format!("w{i}"))).collect())
    }
}

#[tokio::test]
async fn retries_empty_pulls_until_messages_arrive() {
    let sub = Scripted::new(vec![Ok(vec![]), Ok(vec![]), Ok(vec![msg("m1")])]);
    let got = pull_wait(&sub, &Cancellation::new(), &QueueKey::from("q"), 5)
        .await
        .unwrap();

    assert_eq!(got, vec![msg("m1")]);
    assert_eq!(sub.pull_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn returns_first_pull_error() {
    let sub = Scripted::new(vec![Ok(vec![]), Err(Error::Sqs("throttled".into()))]);
    let err = pull_wait(&sub, &Cancellation::new(), &QueueKey::from("q"), 1)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Sqs(ref m) if m == "throttled"));
    assert_eq!(sub.pull_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cancelled_before_start_never_pulls() {
    let sub = Scripted::new(vec![Ok(vec![msg("m1")])]);
    let cancel = Cancellation::new();
    cancel.cancel();

    let err = pull_wait(&sub, &cancel, &QueueKey::from("q"), 1)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(sub.pull_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn zero_max_count_requests_one() {
    let sub = Scripted::new(vec![Ok(vec![msg("m1")])]);
    pull_wait(&sub, &Cancellation::new(), &QueueKey::from("q"), 0)
        .await
        .unwrap();
    assert_eq!(sub.last_max.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn delegates_to_native_long_poll() {
    let sub = LongPolling {
        pull_calls: AtomicUsize::new(0),
        wait_calls: AtomicUsize::new(0),
    };
    let got = pull_wait(&sub, &Cancellation::new(), &QueueKey::from("q"), 3)
        .await
        .unwrap();

    assert_eq!(got, vec![msg("w0"), msg("w1"), msg("w2")]);
    assert_eq!(sub.wait_calls.load(Ordering::SeqCst), 1);
    assert_eq!(sub.pull_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancel_while_polling_empty_queue_stops() {
    let sub = std::sync::Arc::new(MemorySubscriber::new());
    let cancel = Cancellation::new();

    let waiter = {
        let sub = sub.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { pull_wait(sub.as_ref(), &cancel, &QueueKey::from("q"), 1).await })
    };

    tokio::task::yield_now().await;
    cancel.cancel();
    let result = tokio::time::timeout(std::time::Duration::from_secs(5), waiter)
        .await
        .expect("pull_wait should observe cancel")
        .unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));
}

#[tokio::test]
async fn memory_backend_never_returns_more_than_requested() {
    let sub = MemorySubscriber::new();
    let q = QueueKey::from("q");
    for i in 0..20 {
        sub.push(&q, format!("{i}")).unwrap();
    }
    for requested in [1, 3, 7, 50] {
        let got = pull_wait(&sub, &Cancellation::new(), &q, requested)
            .await
            .unwrap();
        assert!(got.len() <= requested);
    }
}
