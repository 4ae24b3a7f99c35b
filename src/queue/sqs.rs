//! Amazon SQS subscriber.
//!
//! Queue keys resolve to queue URLs through the configured [`QueueMap`].
//! SQS reports redeliveries only through the `ApproximateReceiveCount`
//! attribute, which is not requested here, so `delivery_count` is always 0.

use super::{QueueMap, Subscriber, effective_visibility_timeout};
use crate::error::{Error, Result};
use crate::model::{Message, QueueKey};
use crate::telemetry::metrics;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::error::DisplayErrorContext;
use opentelemetry::KeyValue;
use tracing::{debug, error};

/// Largest batch SQS returns from one receive.
pub const MAX_BATCH: usize = 10;

/// Receive options applied to every pull.
#[derive(Debug, Clone)]
pub struct SqsOptions {
    /// Long-poll bound in seconds. 0 returns immediately.
    pub wait_time_secs: i32,
    /// Seconds a received message stays hidden. Non-positive means 30.
    pub visibility_timeout_secs: i32,
}

impl Default for SqsOptions {
    fn default() -> Self {
        Self {
            wait_time_secs: 20,
            visibility_timeout_secs: 30,
        }
    }
}

/// Map a requested batch size onto SQS's `MaxNumberOfMessages`.
///
/// Counts outside `1..=10` are left unset so SQS applies its default.
pub fn max_number_of_messages(requested: usize) -> Option<i32> {
    if (1..=MAX_BATCH).contains(&requested) {
        i32::try_from(requested).ok()
    } else {
        None
    }
}

pub struct SqsSubscriber {
    client: Client,
    queues: QueueMap,
    options: SqsOptions,
}

impl SqsSubscriber {
    pub fn new(client: Client, queues: QueueMap, options: SqsOptions) -> Self {
        Self {
            client,
            queues,
            options,
        }
    }

    /// Build a client from the ambient AWS configuration, optionally pointed at
    /// a different endpoint (e.g. LocalStack).
    pub async fn from_env(
        queues: QueueMap,
        options: SqsOptions,
        endpoint_url: Option<&str>,
    ) -> Self {
        let shared = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_sqs::config::Builder::from(&shared);
        if let Some(url) = endpoint_url {
            builder = builder.endpoint_url(url);
        }
        let client = Client::from_conf(builder.build());
        debug!(queues = queues.keys().count(), "sqs subscriber initialized");
        Self::new(client, queues, options)
    }

    /// Queue URL for `key`.
    fn queue_url(&self, key: &QueueKey) -> Result<&str> {
        self.queues.resolve(key).inspect_err(|e| {
            error!(queue = %key, error = %e, "queue key has no sqs url");
        })
    }
}

#[async_trait]
impl Subscriber for SqsSubscriber {
    async fn pull(&self, queue: &QueueKey, max_count: usize) -> Result<Vec<Message>> {
        let url = self.queue_url(queue)?;

        let output = self
            .client
            .receive_message()
            .queue_url(url)
            .set_max_number_of_messages(max_number_of_messages(max_count))
            .wait_time_seconds(self.options.wait_time_secs.max(0))
            .visibility_timeout(effective_visibility_timeout(
                self.options.visibility_timeout_secs,
            ))
            .send()
            .await
            .map_err(|e| Error::Sqs(DisplayErrorContext(&e).to_string()))?;

        let messages: Vec<Message> = output
            .messages()
            .iter()
            .map(|m| Message {
                id: m.message_id().unwrap_or_default().to_string(),
                ack_token: m.receipt_handle().unwrap_or_default().to_string(),
                payload: m.body().unwrap_or_default().as_bytes().to_vec(),
                delivery_count: 0,
                enqueued_at: None,
            })
            .collect();

        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", queue.to_string()),
                KeyValue::new(
                    "operation",
                    if messages.is_empty() { "pull_empty" } else { "pull" },
                ),
            ],
        );
        Ok(messages)
    }

    async fn acknowledge(&self, queue: &QueueKey, ack_token: &str) -> Result<()> {
        let url = self.queue_url(queue)?;
        self.client
            .delete_message()
            .queue_url(url)
            .receipt_handle(ack_token)
            .send()
            .await
            .map_err(|e| Error::Sqs(DisplayErrorContext(&e).to_string()))?;
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", queue.to_string()),
                KeyValue::new("operation", "ack"),
            ],
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_outside_range_uses_backend_default() {
        assert_eq!(max_number_of_messages(0), None);
        assert_eq!(max_number_of_messages(11), None);
        assert_eq!(max_number_of_messages(500), None);
    }

    #[test]
    fn batch_size_within_range_passes_through() {
        assert_eq!(max_number_of_messages(1), Some(1));
        assert_eq!(max_number_of_messages(7), Some(7));
        assert_eq!(max_number_of_messages(MAX_BATCH), Some(10));
    }

    #[test]
    fn default_options_long_poll() {
        let opts = SqsOptions::default();
        assert_eq!(opts.wait_time_secs, 20);
        assert_eq!(effective_visibility_timeout(opts.visibility_timeout_secs), 30);
    }
}
