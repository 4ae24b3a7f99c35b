//! # jobq
//!
//! Reliable job-queue consumption.
//!
//! Provides a backend-agnostic pull/acknowledge contract (SQS, pgmq, and an
//! in-memory queue), a supervising worker loop with exponential backoff, and
//! Postgres advisory locks for per-entity mutual exclusion across workers.

pub mod cancel;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod model;
pub mod queue;
pub mod telemetry;
