//! Event handler that delegates the business effect to an executable.

use super::handler::EventHandler;
use crate::error::{Error, Result};
use crate::model::{JobEvent, Message};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info};

/// Runs `command` once per event with the event in its environment:
/// `JOBQ_DOMAIN`, `JOBQ_ACTION` (empty if none), `JOBQ_ENTITY_ID`,
/// `JOBQ_MESSAGE_ID`, `JOBQ_DELIVERY_COUNT` and `JOBQ_PAYLOAD` (event JSON).
///
/// A non-zero exit fails the job. The child is killed if the handling future
/// is dropped.
#[derive(Debug, Clone)]
pub struct HookHandler {
    command: PathBuf,
}

impl HookHandler {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &Path {
        &self.command
    }

    /// Relative commands resolve against the process working directory.
    fn resolved_command(&self) -> Result<PathBuf> {
        if self.command.is_relative() {
            Ok(std::env::current_dir()?.join(&self.command))
        } else {
            Ok(self.command.clone())
        }
    }
}

#[async_trait]
impl EventHandler for HookHandler {
    async fn handle_event(&self, event: &JobEvent, message: &Message) -> Result<()> {
        let command = self.resolved_command()?;
        let payload = serde_json::to_string(event)?;
        let start = Instant::now();

        debug!(
            command = %command.display(),
            entity_id = %event.entity_id,
            "running hook"
        );

        let status = Command::new(&command)
            .env("JOBQ_DOMAIN", &event.domain)
            .env("JOBQ_ACTION", event.action.as_deref().unwrap_or(""))
            .env("JOBQ_ENTITY_ID", &event.entity_id)
            .env("JOBQ_MESSAGE_ID", &message.id)
            .env("JOBQ_DELIVERY_COUNT", message.delivery_count.to_string())
            .env("JOBQ_PAYLOAD", payload)
            .kill_on_drop(true)
            .status()
            .await?;

        let duration_ms = start.elapsed().as_millis() as u64;
        if status.success() {
            info!(command = %command.display(), duration_ms, "hook completed");
            Ok(())
        } else {
            Err(Error::Hook(format!(
                "{} exited with status {}",
                command.display(),
                status.code().unwrap_or(-1)
            )))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_exit_succeeds() {
        let hook = HookHandler::new("/bin/true");
        let event = JobEvent::new("team", "t-1").action("sync");
        hook.handle_event(&event, &Message::new("1", "1", Vec::new()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_zero_exit_fails_the_job() {
        let hook = HookHandler::new("/bin/false");
        let event = JobEvent::new("team", "t-1");
        let err = hook
            .handle_event(&event, &Message::new("1", "1", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Hook(ref m) if m.contains("status 1")));
    }

    #[tokio::test]
    async fn missing_command_is_an_io_error() {
        let hook = HookHandler::new("/nonexistent/jobq-hook");
        let event = JobEvent::new("team", "t-1");
        let err = hook
            .handle_event(&event, &Message::new("1", "1", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
