//! pgmq queue operations via direct SQLx.
//!
//! Calls pgmq's SQL functions: pgmq.create, pgmq.send, pgmq.read,
//! pgmq.read_with_poll, pgmq.archive, pgmq.delete.

use crate::error::Result;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

/// A message read from a pgmq queue.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PgmqMessage {
    pub msg_id: i64,
    /// Reads so far, including the one that returned this row.
    pub read_ct: i32,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    pub vt: chrono::DateTime<chrono::Utc>,
    pub message: serde_json::Value,
}

fn record(queue_name: &str, operation: &'static str) {
    metrics::queue_operations().add(
        1,
        &[
            KeyValue::new("queue", queue_name.to_string()),
            KeyValue::new("operation", operation),
        ],
    );
}

impl super::Db {
    /// Create a pgmq queue (idempotent).
    pub async fn create_queue(&self, queue_name: &str) -> Result<()> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue_name)
            .execute(&self.pool)
            .await?;
        record(queue_name, "create");
        Ok(())
    }

    /// Send a message to a pgmq queue. Returns the message ID.
    /// delay_seconds: 0 for immediate, >0 for delayed delivery.
    pub async fn send_to_queue(
        &self,
        queue_name: &str,
        payload: &serde_json::Value,
        delay_seconds: i32,
    ) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT pgmq.send($1, $2, $3)")
            .bind(queue_name)
            .bind(payload)
            .bind(delay_seconds)
            .fetch_one(&self.pool)
            .await?;
        record(queue_name, "send");
        Ok(row.0)
    }

    /// Read up to `qty` messages, hiding them for `vt_seconds`.
    /// Returns immediately, possibly with nothing.
    pub async fn read_batch(
        &self,
        queue_name: &str,
        vt_seconds: i32,
        qty: i32,
    ) -> Result<Vec<PgmqMessage>> {
        let rows: Vec<PgmqMessage> = sqlx::query_as(
            "SELECT msg_id, read_ct, enqueued_at, vt, message FROM pgmq.read($1, $2, $3)",
        )
        .bind(queue_name)
        .bind(vt_seconds)
        .bind(qty)
        .fetch_all(&self.pool)
        .await?;

        record(queue_name, if rows.is_empty() { "pull_empty" } else { "pull" });
        Ok(rows)
    }

    /// Like [`read_batch`](Self::read_batch), but waits server-side up to
    /// `max_poll_seconds` for a message to arrive.
    pub async fn read_with_poll(
        &self,
        queue_name: &str,
        vt_seconds: i32,
        qty: i32,
        max_poll_seconds: i32,
        poll_interval_ms: i32,
    ) -> Result<Vec<PgmqMessage>> {
        let rows: Vec<PgmqMessage> = sqlx::query_as(
            "SELECT msg_id, read_ct, enqueued_at, vt, message
             FROM pgmq.read_with_poll($1, $2, $3, $4, $5)",
        )
        .bind(queue_name)
        .bind(vt_seconds)
        .bind(qty)
        .bind(max_poll_seconds)
        .bind(poll_interval_ms)
        .fetch_all(&self.pool)
        .await?;

        record(queue_name, if rows.is_empty() { "pull_empty" } else { "pull" });
        Ok(rows)
    }

    /// Archive a message (moves to archive table, preserves for audit).
    pub async fn archive_message(&self, queue_name: &str, msg_id: i64) -> Result<()> {
        sqlx::query("SELECT pgmq.archive($1, $2)")
            .bind(queue_name)
            .bind(msg_id)
            .execute(&self.pool)
            .await?;
        record(queue_name, "archive");
        Ok(())
    }

    /// Delete a message permanently.
    pub async fn delete_message(&self, queue_name: &str, msg_id: i64) -> Result<()> {
        sqlx::query("SELECT pgmq.delete($1, $2)")
            .bind(queue_name)
            .bind(msg_id)
            .execute(&self.pool)
            .await?;
        record(queue_name, "ack");
        Ok(())
    }
}
