//! Reference claim → publish → delete loop over [`ProcessorStorage`].
use crate::clock::Clock;
use crate::db::{ClaimedEntry, ProcessorStorage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info, instrument, warn};

/// Delivers a claimed batch to the outside world.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, entries: &[ClaimedEntry]) -> Result<()>;
}

/// Publisher that only traces what it would send.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, entries: &[ClaimedEntry]) -> Result<()> {
        for entry in entries {
            info!(
                id = %entry.id,
                namespace = entry.namespace.as_deref().unwrap_or(""),
                key = %String::from_utf8_lossy(&entry.key),
                payload_len = entry.payload.len(),
                "published outbox entry"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub processor_id: String,
    pub claim_duration: chrono::Duration,
    pub batch_size: usize,
    pub poll_interval: Duration,
}

/// Run one claim/fetch/publish/delete cycle. Returns how many entries were
/// published and removed.
///
/// A failed publish leaves the batch claimed; the lease lapses and the entries
/// are picked up again by a later claim.
#[instrument(skip_all, fields(processor_id = %settings.processor_id))]
pub async fn process_next_batch(
    storage: &dyn ProcessorStorage,
    clock: &dyn Clock,
    publisher: &dyn Publisher,
    settings: &ProcessorSettings,
) -> Result<usize> {
    let deadline = clock
        .now()
        .checked_add_signed(settings.claim_duration)
        .context("claim deadline is out of range")?;
    storage
        .claim_entries(&settings.processor_id, deadline)
        .await
        .context("claim outbox entries")?;

    let claimed = storage
        .get_claimed_entries(&settings.processor_id, settings.batch_size)
        .await
        .context("fetch claimed outbox entries")?;
    if claimed.is_empty() {
        return Ok(0);
    }

    if let Err(err) = publisher.publish(&claimed).await {
        warn!(?err, count = claimed.len(), "publish failed; entries stay claimed");
        return Ok(0);
    }

    let ids: Vec<String> = claimed.iter().map(|c| c.id.clone()).collect();
    storage
        .delete_entries(&ids)
        .await
        .context("delete published outbox entries")?;
    info!(count = ids.len(), "outbox batch published");
    Ok(ids.len())
}

/// Repeat [`process_next_batch`] until `shutdown` resolves, sleeping for the
/// poll interval whenever a cycle is idle or fails. `wake.notify_one()` cuts
/// the sleep short, e.g. right after a writer commits new entries.
pub async fn run_processor(
    storage: &dyn ProcessorStorage,
    clock: &dyn Clock,
    publisher: &dyn Publisher,
    settings: &ProcessorSettings,
    wake: &Notify,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);
    loop {
        let idle = match process_next_batch(storage, clock, publisher, settings).await {
            Ok(published) => published == 0,
            Err(err) => {
                error!(?err, "outbox processor error");
                true
            }
        };
        let pause = if idle { settings.poll_interval } else { Duration::ZERO };
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = wake.notified() => {}
            _ = tokio::time::sleep(pause) => {}
        }
    }
    info!("outbox processor stopped");
}
