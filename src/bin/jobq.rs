//! jobq CLI: run a queue worker, operate pgmq queues.

use anyhow::Context;
use clap::{Parser, Subcommand};
use jobq::cancel::Cancellation;
use jobq::config::settings::{BackendKind, Settings};
use jobq::config::Config;
use jobq::db::Db;
use jobq::engine::{Dispatcher, EventHandler, Exclusive, HookHandler, Worker};
use jobq::model::QueueKey;
use jobq::queue::{PgmqSubscriber, SqsSubscriber, Subscriber};
use jobq::telemetry::job::start_queue_worker_span;
use jobq::telemetry::{TelemetryConfig, init_telemetry};
use secrecy::ExposeSecret;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "jobq", about = "Reliable job-queue worker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Consume one queue until interrupted
    Serve {
        /// Logical queue key (must be mapped in [queues])
        #[arg(long)]
        queue: String,
        /// Settings file (overrides JOBQ_SETTINGS)
        #[arg(long)]
        settings: Option<PathBuf>,
    },
    /// pgmq queue operations
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Create the pgmq queue a key maps to
    Create {
        /// Logical queue key
        queue: String,
        #[arg(long)]
        settings: Option<PathBuf>,
    },
    /// Send a JSON payload to the pgmq queue a key maps to
    Send {
        /// Logical queue key
        queue: String,
        /// JSON payload, e.g. '{"domain":"team","action":"sync","entity_id":"t-1"}'
        payload: String,
        /// Delay before the message becomes visible, in seconds
        #[arg(long, default_value_t = 0)]
        delay: i32,
        #[arg(long)]
        settings: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Serve { queue, settings } => {
            let settings = load_settings(&config, settings)?;
            cmd_serve(&config, settings, QueueKey::from(queue)).await
        }
        Command::Queue { action } => {
            let db = Db::connect(config.database_url.expose_secret()).await?;
            db.migrate().await?;
            match action {
                QueueAction::Create { queue, settings } => {
                    let settings = load_settings(&config, settings)?;
                    let name = settings.queues.resolve(&QueueKey::from(queue))?;
                    db.create_queue(name).await?;
                    println!("Created pgmq queue {name}");
                    Ok(())
                }
                QueueAction::Send {
                    queue,
                    payload,
                    delay,
                    settings,
                } => {
                    let settings = load_settings(&config, settings)?;
                    let name = settings.queues.resolve(&QueueKey::from(queue))?;
                    let payload: serde_json::Value =
                        serde_json::from_str(&payload).context("payload is not valid JSON")?;
                    let msg_id = db.send_to_queue(name, &payload, delay).await?;
                    println!("Sent message {msg_id} to {name}");
                    Ok(())
                }
            }
        }
    }
}

fn load_settings(config: &Config, path: Option<PathBuf>) -> anyhow::Result<Settings> {
    let path = path.unwrap_or_else(|| config.settings_path.clone());
    Ok(Settings::load(&path)?)
}

async fn cmd_serve(config: &Config, settings: Settings, queue: QueueKey) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "jobq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    // Fail before connecting anything if the key is not mapped.
    settings.queues.resolve(&queue)?;

    // Postgres backs the advisory locks for every backend; the pgmq
    // extension is only installed when the queues live there too.
    let db = Db::connect(config.database_url.expose_secret()).await?;
    if settings.backend.kind.requires_pgmq() {
        db.migrate().await?;
    }

    let subscriber: Arc<dyn Subscriber> = match settings.backend.kind {
        BackendKind::Sqs => Arc::new(
            SqsSubscriber::from_env(
                settings.queues.clone(),
                settings.backend.sqs_options(),
                settings.backend.endpoint_url.as_deref(),
            )
            .await,
        ),
        BackendKind::Pgmq => Arc::new(PgmqSubscriber::new(
            db.clone(),
            settings.queues.clone(),
            settings.backend.pgmq_options(),
        )),
    };

    let mut dispatcher = Dispatcher::new();
    for h in &settings.handlers {
        let hook = HookHandler::new(&h.command);
        let handler: Arc<dyn EventHandler> = if h.exclusive {
            Arc::new(Exclusive::new(db.clone(), hook).kind(h.lock_kind()))
        } else {
            Arc::new(hook)
        };
        dispatcher.register(&h.domain, h.action.as_deref(), handler);
    }
    info!(
        queue = %queue,
        handlers = dispatcher.len(),
        backend = ?settings.backend.kind,
        "serving"
    );

    let cancel = Cancellation::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("interrupt received, stopping worker");
        on_signal.cancel();
    });

    let worker = Worker::new(subscriber, settings.worker.max_attempts)
        .with_span(start_queue_worker_span(&queue, &Uuid::new_v4()));
    worker
        .start(
            &settings.worker.worker_config(),
            &queue,
            &dispatcher,
            &cancel,
        )
        .await?;
    Ok(())
}
