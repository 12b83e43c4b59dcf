// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `burble serve` command implementation.
//!
//! Starts the full pipeline against SQLite: buffer manager, lock-coordinated
//! queue consumer, and the queue pump, wired to a logging batch processor.
//! Inbound events are read as JSON lines from stdin (one event per line),
//! which is the local stand-in for a messaging-platform webhook:
//!
//! ```text
//! {"conversation_id":"chat-1","sender_id":"alice","text":"hello"}
//! ```
//!
//! Supports graceful shutdown via ctrl-c.

use std::sync::Arc;

use async_trait::async_trait;
use burble_config::model::BurbleConfig;
use burble_core::types::now_millis;
use burble_core::{
    BatchProcessor, BufferedItem, BurbleError, ConversationId, PluginAdapter, QueueAdapter,
    StoreAdapter,
};
use burble_pipeline::{BufferManager, QueueConsumer, QueuePump};
use burble_storage::SqliteStorage;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One inbound event on the local ingest surface.
#[derive(Debug, Deserialize)]
struct IngestEvent {
    conversation_id: String,
    sender_id: String,
    text: String,
    #[serde(default)]
    image_urls: Vec<String>,
    #[serde(default)]
    origin_message_id: Option<String>,
}

/// Stand-in processing callback: logs each batch where a real deployment
/// would generate and dispatch a reply.
struct LoggingProcessor;

#[async_trait]
impl BatchProcessor for LoggingProcessor {
    async fn process(
        &self,
        conversation_id: &ConversationId,
        items: &[BufferedItem],
    ) -> Result<(), BurbleError> {
        let preview: Vec<&str> = items.iter().map(|i| i.text.as_str()).collect();
        info!(
            conversation_id = %conversation_id,
            count = items.len(),
            messages = ?preview,
            "processing batch"
        );
        Ok(())
    }
}

/// Runs the `burble serve` command.
///
/// Initializes storage, wires the pipeline, spawns the queue pump, and
/// consumes stdin events until EOF or ctrl-c.
pub async fn run_serve(config: BurbleConfig) -> Result<(), BurbleError> {
    init_tracing(&config.agent.log_level);

    info!(name = config.agent.name.as_str(), "starting burble serve");

    // Initialize storage; one SQLite adapter backs both boundaries.
    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;

    let store: Arc<dyn StoreAdapter + Send + Sync> = storage.clone();
    let queue: Arc<dyn QueueAdapter + Send + Sync> = storage.clone();

    let buffers = BufferManager::new(store.clone(), queue.clone(), &config.buffer);
    let consumer = Arc::new(QueueConsumer::new(
        store,
        buffers.clone(),
        Arc::new(LoggingProcessor),
        &config.consumer,
    ));
    let pump = QueuePump::new(queue, consumer, &config.consumer);

    // Install signal handler.
    let cancel = install_signal_handler();

    // Spawn the queue pump.
    let pump_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { pump.run(cancel).await }
    });

    // Consume stdin events until EOF or shutdown.
    run_ingest(&buffers, config.buffer.batch_limit, cancel.clone()).await;

    // EOF on stdin also means shutdown.
    cancel.cancel();
    if let Err(e) = pump_task.await {
        warn!(error = %e, "queue pump task ended abnormally");
    }

    storage.shutdown().await?;
    info!("burble serve shutdown complete");
    Ok(())
}

/// Reads JSON-line events from stdin and feeds them into the buffer
/// manager. Malformed lines and buffering failures are logged and skipped;
/// they never stop the ingest loop.
async fn run_ingest(buffers: &BufferManager, batch_limit: usize, cancel: CancellationToken) {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = cancel.cancelled() => break,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("stdin closed, stopping ingest");
                break;
            }
            Err(e) => {
                error!(error = %e, "failed to read from stdin");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let event: IngestEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "ignoring malformed ingest line");
                continue;
            }
        };

        let conversation_id = ConversationId(event.conversation_id);
        let item = BufferedItem {
            sender_id: event.sender_id,
            text: event.text,
            image_urls: event.image_urls,
            timestamp_ms: now_millis(),
            origin_message_id: event
                .origin_message_id
                .unwrap_or_else(|| format!("local-{}", now_millis())),
        };

        match buffers.buffer_message(&conversation_id, item, batch_limit).await {
            Ok(()) => debug!(conversation_id = %conversation_id, "event buffered"),
            Err(e) => warn!(
                conversation_id = %conversation_id,
                error = %e,
                "failed to buffer event"
            ),
        }
    }
}

/// Installs a ctrl-c handler that cancels the returned token.
fn install_signal_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            trigger.cancel();
        }
    });
    cancel
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("burble={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
