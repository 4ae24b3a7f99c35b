//! Metric instrument factories for jobq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without one installed the instruments are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("jobq")
}

/// Counter: backend operations.
/// Labels: `queue`, `operation` ("pull" | "pull_empty" | "ack" | "archive" | "send" | "create").
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("jobq.queue.operations")
        .with_description("Number of queue backend operations")
        .build()
}

/// Counter: messages passed to a handler.
/// Labels: `queue`, `result` ("ok" | "failed" | "ack_failed").
pub fn jobs_handled() -> Counter<u64> {
    meter()
        .u64_counter("jobq.jobs.handled")
        .with_description("Number of messages handled by workers")
        .build()
}

/// Counter: handler runs skipped because another worker held the entity lock.
/// Labels: `domain`.
pub fn lock_contention() -> Counter<u64> {
    meter()
        .u64_counter("jobq.lock.contention")
        .with_description("Advisory lock attempts that found the lock taken")
        .build()
}

/// Histogram: delay slept after a failed worker cycle, in milliseconds.
/// Labels: `queue`.
pub fn backoff_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("jobq.worker.backoff_ms")
        .with_description("Worker backoff delay after a failed cycle")
        .with_unit("ms")
        .build()
}

/// Histogram: handler duration in milliseconds.
/// Labels: `queue`.
pub fn handle_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("jobq.jobs.duration_ms")
        .with_description("Handler duration in milliseconds")
        .with_unit("ms")
        .build()
}
