//! TOML settings: worker tuning, backend choice, queue map, handlers.
//!
//! ```toml
//! [worker]
//! max_count = 10
//! max_attempts = 5
//!
//! [backend]
//! kind = "sqs"
//! wait_time_secs = 20
//!
//! [queues]
//! teams = "https://sqs.eu-west-1.amazonaws.com/123456789012/teams"
//!
//! [[handlers]]
//! domain = "team"
//! action = "sync"
//! command = "hooks/team-sync"
//! ```

use crate::engine::WorkerConfig;
use crate::error::{Error, Result};
use crate::queue::QueueMap;
use crate::queue::pgmq::PgmqOptions;
use crate::queue::sqs::SqsOptions;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub worker: WorkerSettings,
    pub backend: BackendSettings,
    #[serde(default)]
    pub queues: QueueMap,
    #[serde(default)]
    pub handlers: Vec<HandlerSettings>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerSettings {
    pub max_count: usize,
    /// Deliveries after which failures are logged as errors.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_count: 10,
            max_attempts: 5,
            base_backoff_ms: 1000,
            max_backoff_secs: 60,
        }
    }
}

impl WorkerSettings {
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            max_count: self.max_count,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Sqs,
    Pgmq,
}

impl BackendKind {
    /// Whether the queues themselves live in Postgres. Advisory locks need
    /// Postgres for every backend, the pgmq extension only for this one.
    pub fn requires_pgmq(self) -> bool {
        matches!(self, Self::Pgmq)
    }
}

/// Longest long-poll SQS accepts.
const SQS_MAX_WAIT_SECS: i32 = 20;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendSettings {
    pub kind: BackendKind,
    #[serde(default = "default_wait_time")]
    pub wait_time_secs: i32,
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: i32,
    /// SQS endpoint override, e.g. LocalStack.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// pgmq: archive instead of delete on acknowledge.
    #[serde(default)]
    pub archive_on_ack: bool,
    /// pgmq: server-side long-poll bound per round.
    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: i32,
}

fn default_wait_time() -> i32 {
    20
}

fn default_visibility_timeout() -> i32 {
    30
}

fn default_poll_seconds() -> i32 {
    5
}

impl BackendSettings {
    pub fn sqs_options(&self) -> SqsOptions {
        SqsOptions {
            wait_time_secs: self.wait_time_secs,
            visibility_timeout_secs: self.visibility_timeout_secs,
        }
    }

    pub fn pgmq_options(&self) -> PgmqOptions {
        PgmqOptions {
            visibility_timeout_secs: self.visibility_timeout_secs,
            poll_seconds: self.poll_seconds,
            archive_on_ack: self.archive_on_ack,
            ..PgmqOptions::default()
        }
    }
}

/// One `[[handlers]]` entry: an executable hook routed by (domain, action).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerSettings {
    pub domain: String,
    #[serde(default)]
    pub action: Option<String>,
    pub command: PathBuf,
    /// Hold the entity's advisory lock while the hook runs.
    #[serde(default = "default_exclusive")]
    pub exclusive: bool,
    /// Lock suffix; defaults to the domain.
    #[serde(default)]
    pub lock_kind: Option<String>,
}

fn default_exclusive() -> bool {
    true
}

impl HandlerSettings {
    pub fn lock_kind(&self) -> &str {
        self.lock_kind.as_deref().unwrap_or(&self.domain)
    }
}

impl Settings {
    /// Read and validate a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read settings {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("bad settings {}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.worker.max_count == 0 {
            return Err(Error::Config("worker.max_count must be at least 1".into()));
        }
        if self.queues.is_empty() {
            return Err(Error::Config("no [queues] configured".into()));
        }
        if self.backend.kind == BackendKind::Sqs
            && !(0..=SQS_MAX_WAIT_SECS).contains(&self.backend.wait_time_secs)
        {
            return Err(Error::Config(format!(
                "backend.wait_time_secs must be between 0 and {SQS_MAX_WAIT_SECS} for sqs, got {}",
                self.backend.wait_time_secs
            )));
        }

        let mut routes = HashSet::new();
        for h in &self.handlers {
            if h.domain.is_empty() {
                return Err(Error::Config("handler with empty domain".into()));
            }
            if !routes.insert((h.domain.as_str(), h.action.as_deref())) {
                return Err(Error::Config(format!(
                    "duplicate handler for {}/{}",
                    h.domain,
                    h.action.as_deref().unwrap_or("*")
                )));
            }
        }
        Ok(())
    }
}
