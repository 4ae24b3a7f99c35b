//! Span helpers for workers and the messages they handle.

use crate::model::{Message, QueueKey};
use tracing::Span;
use uuid::Uuid;

/// Span covering one worker's lifetime. Lifecycle events nest under it.
pub fn start_worker_span(worker_id: &Uuid) -> Span {
    tracing::info_span!("worker", "worker.id" = %worker_id)
}

/// Worker span that also names the queue it consumes.
pub fn start_queue_worker_span(queue: &QueueKey, worker_id: &Uuid) -> Span {
    tracing::info_span!("worker", "worker.id" = %worker_id, "worker.queue" = %queue)
}

/// Span for handling one message.
///
/// `job.result` is declared empty and filled in by [`record_result`].
pub fn start_job_span(queue: &QueueKey, message: &Message) -> Span {
    tracing::info_span!(
        "job.handle",
        "job.queue" = %queue,
        "job.message_id" = %message.id,
        "job.delivery_count" = message.delivery_count,
        "job.result" = tracing::field::Empty,
    )
}

/// Record how handling ended on a span from [`start_job_span`].
pub fn record_result(span: &Span, result: &str) {
    span.record("job.result", result);
}
