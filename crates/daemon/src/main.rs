//! streamq daemon - Main Entry Point
//! Runs a demo order producer and consumer against an in-memory stream

mod orders;
mod settings;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use settings::DaemonConfig;
use streamq_core::port::{SystemTimeProvider, TimeProvider};
use streamq_core::{shutdown_channel, Queue, QueueError, VERSION};
use streamq_infra_memory::MemoryStreamStore;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging (JSON for production, pretty for development)
    let log_format = std::env::var("STREAMQ_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("streamq=info"))
        .context("Failed to create env filter")?;

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("streamq daemon v{} starting...", VERSION);

    // 2. Load configuration
    let cfg = DaemonConfig::load()?;
    info!(
        stream = %cfg.stream,
        group = %cfg.group,
        workers = cfg.concurrent_size,
        max_retries = cfg.max_retries,
        "Configuration loaded"
    );

    // 3. Setup dependencies (DI wiring)
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let store = Arc::new(MemoryStreamStore::with_time_provider(time_provider));
    let queue = Queue::new(store, cfg.stream.clone(), cfg.stream_options());

    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    // 4. Start consumer
    let consumer_name = cfg.consumer_name();
    info!(consumer = %consumer_name, "Starting consumer...");
    let consumer_handle = {
        let queue = queue.clone();
        let ctx = shutdown_rx.clone();
        let group = cfg.group.clone();
        let handler = orders::order_handler(Duration::from_millis(cfg.work_ms), cfg.fail_every);
        let opts = cfg.consumer_options();
        tokio::spawn(async move {
            match queue.consume(ctx, &group, &consumer_name, handler, opts).await {
                Ok(()) | Err(QueueError::Cancelled | QueueError::QueueClosed) => {}
                Err(e) => error!(error = %e, "Consumer failed"),
            }
        })
    };

    // 5. Start producer
    let producer_handle = if cfg.publish_interval_ms > 0 {
        info!(interval_ms = cfg.publish_interval_ms, "Starting producer...");
        Some(tokio::spawn(orders::produce(
            queue.clone(),
            shutdown_rx.clone(),
            Duration::from_millis(cfg.publish_interval_ms),
        )))
    } else {
        None
    };

    info!("System ready. Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown
    shutdown_tx.shutdown();
    if let Some(handle) = producer_handle {
        let _ = handle.await;
    }
    if let Err(e) = queue.close().await {
        warn!(error = %e, "Queue did not drain cleanly");
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), consumer_handle).await;

    info!("Shutdown complete.");
    Ok(())
}
