//! Worker loop: wait for a batch, handle it in order, acknowledge, repeat.

use super::backoff::Backoff;
use super::handler::Handler;
use crate::cancel::Cancellation;
use crate::error::{Error, Result};
use crate::model::{Message, QueueKey};
use crate::queue::{Subscriber, pull_wait};
use crate::telemetry::job::{record_result, start_job_span, start_worker_span};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, Level, Span, debug, error, info, warn};
use uuid::Uuid;

/// Per-run worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Largest batch requested per cycle.
    pub max_count: usize,
    /// First backoff delay after a failed cycle.
    pub base_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_count: 10,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Log level for a failed delivery: error once the message has been
/// delivered `max_attempts` times before, warning until then.
pub fn failure_level(delivery_count: u32, max_attempts: u32) -> Level {
    if delivery_count >= max_attempts {
        Level::ERROR
    } else {
        Level::WARN
    }
}

/// Sequential consumer of one queue.
///
/// Messages are never dropped or dead-lettered here: a failed message stays
/// unacknowledged and the backend redelivers it. `max_attempts` only raises
/// the log severity.
pub struct Worker {
    subscriber: Arc<dyn Subscriber>,
    max_attempts: u32,
    span: Span,
}

impl Worker {
    pub fn new(subscriber: Arc<dyn Subscriber>, max_attempts: u32) -> Self {
        Self {
            subscriber,
            max_attempts,
            span: start_worker_span(&Uuid::new_v4()),
        }
    }

    /// Emit this worker's events under `span` instead of a fresh worker span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Run cycles until `cancel` fires.
    ///
    /// A failed cycle sleeps for the current backoff, which then doubles up
    /// to `config.max_backoff`; a clean cycle resets it to
    /// `config.base_backoff`. Only fatal (configuration) errors end the loop
    /// with `Err`.
    pub async fn start(
        &self,
        config: &WorkerConfig,
        queue: &QueueKey,
        handler: &dyn Handler,
        cancel: &Cancellation,
    ) -> Result<()> {
        self.run(config, queue, handler, cancel)
            .instrument(self.span.clone())
            .await
    }

    async fn run(
        &self,
        config: &WorkerConfig,
        queue: &QueueKey,
        handler: &dyn Handler,
        cancel: &Cancellation,
    ) -> Result<()> {
        let mut backoff = Backoff::new(config.base_backoff, config.max_backoff);
        info!(queue = %queue, max_count = config.max_count, "worker started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self
                .pull_and_handle(cancel, queue, config.max_count, handler)
                .await
            {
                Ok(()) => backoff.reset(),
                Err(Error::Cancelled) if cancel.is_cancelled() => break,
                Err(e) if e.is_fatal() => {
                    error!(queue = %queue, error = %e, "worker stopping on configuration error");
                    return Err(e);
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    metrics::backoff_ms().record(
                        delay.as_millis() as f64,
                        &[KeyValue::new("queue", queue.to_string())],
                    );
                    debug!(
                        queue = %queue,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "cycle failed, backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => break,
                    }
                }
            }
        }

        info!(queue = %queue, "worker stopped");
        Ok(())
    }

    /// One cycle: wait for a batch and handle its messages in order.
    ///
    /// Stops at the first handler or acknowledge failure and returns it; the
    /// rest of the batch is left unacknowledged for independent redelivery.
    /// An acknowledge failure happens after the handler's effect, so the
    /// message may be processed again.
    pub async fn pull_and_handle(
        &self,
        cancel: &Cancellation,
        queue: &QueueKey,
        max_count: usize,
        handler: &dyn Handler,
    ) -> Result<()> {
        async {
            let messages = match pull_wait(self.subscriber.as_ref(), cancel, queue, max_count).await
            {
                Ok(messages) => messages,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!(queue = %queue, error = %e, "pull failed");
                    return Err(e);
                }
            };

            debug!(queue = %queue, count = messages.len(), "batch received");
            for message in &messages {
                self.handle_one(queue, message, handler).await?;
            }
            Ok(())
        }
        .instrument(self.span.clone())
        .await
    }

    async fn handle_one(
        &self,
        queue: &QueueKey,
        message: &Message,
        handler: &dyn Handler,
    ) -> Result<()> {
        let span = start_job_span(queue, message);
        let started = Instant::now();
        let handled = handler.handle_job(message).instrument(span.clone()).await;
        metrics::handle_duration_ms().record(
            started.elapsed().as_millis() as f64,
            &[KeyValue::new("queue", queue.to_string())],
        );

        if let Err(e) = handled {
            self.fail(&span, queue, message, &e, "failed", "handler failed");
            return Err(e);
        }

        if let Err(e) = self
            .subscriber
            .acknowledge(queue, &message.ack_token)
            .instrument(span.clone())
            .await
        {
            self.fail(
                &span,
                queue,
                message,
                &e,
                "ack_failed",
                "acknowledge failed after handling; message may be processed again",
            );
            return Err(e);
        }

        record_result(&span, "ok");
        count_job(queue, "ok");
        span.in_scope(|| debug!(message_id = %message.id, "job handled"));
        Ok(())
    }

    fn fail(
        &self,
        span: &Span,
        queue: &QueueKey,
        message: &Message,
        error: &Error,
        result: &'static str,
        what: &str,
    ) {
        record_result(span, result);
        count_job(queue, result);
        let _entered = span.enter();
        if failure_level(message.delivery_count, self.max_attempts) == Level::ERROR {
            error!(
                queue = %queue,
                message_id = %message.id,
                delivery_count = message.delivery_count,
                max_attempts = self.max_attempts,
                error = %error,
                "{what}"
            );
        } else {
            warn!(
                queue = %queue,
                message_id = %message.id,
                delivery_count = message.delivery_count,
                error = %error,
                "{what}"
            );
        }
    }
}

fn count_job(queue: &QueueKey, result: &'static str) {
    metrics::jobs_handled().add(
        1,
        &[
            KeyValue::new("queue", queue.to_string()),
            KeyValue::new("result", result),
        ],
    );
}
