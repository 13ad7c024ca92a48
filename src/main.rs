use anyhow::{Context, Result};
use clap::Parser;
use outbox_store::config;
use outbox_store::db::{self, Storage};
use outbox_store::outbox::{self, LogPublisher, ProcessorSettings};
use outbox_store::Message;
use std::path::PathBuf;
use std::time::Duration;
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run an outbox processor alongside a demo writer"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = cfg.database_url();
    info!(%database_url, "connecting to database");
    let pool = db::init_pool(
        &database_url,
        cfg.database.max_connections,
        cfg.busy_timeout(),
    )
    .await
    .context("open outbox database")?;
    let storage = Storage::new(pool);
    storage.migrate().await.context("provision outbox schema")?;

    let settings = ProcessorSettings {
        processor_id: cfg.processor_id(),
        claim_duration: cfg.claim_duration().context("processor claim duration")?,
        batch_size: cfg.processor.batch_size,
        poll_interval: Duration::from_millis(cfg.processor.poll_interval_ms),
    };
    info!(processor_id = %settings.processor_id, "starting outbox processor");

    let (stop_tx, stop_rx) = watch::channel(false);
    let wake = Arc::new(Notify::new());

    let processor_storage = storage.clone();
    let mut processor_stop = stop_rx.clone();
    let processor_wake = wake.clone();
    let processor = tokio::spawn(async move {
        let shutdown = async move {
            let _ = processor_stop.changed().await;
        };
        outbox::run_processor(
            &processor_storage,
            processor_storage.clock(),
            &LogPublisher,
            &settings,
            &processor_wake,
            shutdown,
        )
        .await;
    });

    let write_interval = Duration::from_millis(cfg.demo.write_interval_ms);
    let per_write = cfg.demo.messages_per_write;
    let mut writer_stop = stop_rx;
    let writer_storage = storage.clone();
    let writer = tokio::spawn(async move {
        let mut written = 0usize;
        loop {
            match write_demo_batch(&writer_storage, per_write, written).await {
                Ok(n) => {
                    written += n;
                    info!(queued = n, total = written, "demo writer committed messages");
                    wake.notify_one();
                }
                Err(err) => error!(?err, "demo writer failed"),
            }
            tokio::select! {
                _ = tokio::time::sleep(write_interval) => {}
                _ = writer_stop.changed() => break,
            }
        }
    });

    shutdown_signal().await?;
    info!("shutdown signal received");
    let _ = stop_tx.send(true);

    writer.await.context("join demo writer")?;
    processor.await.context("join outbox processor")?;
    info!("exiting");
    Ok(())
}

/// Resolves on Ctrl-C, or on SIGTERM where the platform has it.
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async { tokio::signal::ctrl_c().await.context("listen for ctrl-c") };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate())
            .context("install SIGTERM handler")?
            .recv()
            .await;
        Ok::<_, anyhow::Error>(())
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();
    tokio::select! {
        res = ctrl_c => res,
        res = terminate => res,
    }
}

/// Enqueue `count` messages in one transaction, the way an application would
/// alongside its own state change.
async fn write_demo_batch(storage: &Storage, count: usize, offset: usize) -> Result<usize> {
    let messages: Vec<Message> = (0..count)
        .map(|i| {
            Message::new("demo-key", format!("demo-payload-{}", offset + i))
                .with_namespace("demo")
        })
        .collect();
    let mut tx = storage.pool().begin().await?;
    storage.enqueue_tx(&mut tx, &messages).await?;
    tx.commit().await?;
    Ok(messages.len())
}
