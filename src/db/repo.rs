use super::model::{dt_to_ms, ClaimedEntry, OutboxEntry};
use crate::clock::{Clock, SystemClock};
use crate::error::StorageError;
use crate::id::{IdGenerator, UuidGenerator};
use crate::model::Message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};
use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

pub type Pool = SqlitePool;

// Older SQLite builds cap a statement at 999 host parameters.
const INSERT_CHUNK_ROWS: usize = 200;
const DELETE_CHUNK_IDS: usize = 500;

/// Open a pool with WAL and full durability. The busy timeout lets concurrent
/// claimers wait on the write lock instead of failing with `SQLITE_BUSY`.
pub async fn init_pool(
    database_url: &str,
    max_connections: u32,
    busy_timeout: Duration,
) -> Result<Pool, StorageError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(busy_timeout);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Create `outbox_entries` if missing. Safe to run repeatedly.
pub async fn run_migrations(pool: &Pool) -> Result<(), StorageError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Operations a processing loop needs from outbox storage.
#[async_trait]
pub trait ProcessorStorage: Send + Sync {
    /// Write `messages` as part of the caller's transaction `txn`.
    async fn enqueue(
        &self,
        txn: &mut (dyn Any + Send),
        messages: &[Message],
    ) -> Result<(), StorageError>;

    /// Claim every unclaimed, self-owned or expired entry for `processor_id`
    /// until `claim_deadline`.
    async fn claim_entries(
        &self,
        processor_id: &str,
        claim_deadline: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Up to `batch_size` entries currently marked with `processor_id`.
    async fn get_claimed_entries(
        &self,
        processor_id: &str,
        batch_size: usize,
    ) -> Result<Vec<ClaimedEntry>, StorageError>;

    /// Remove the given ids; unknown ids are ignored.
    async fn delete_entries(&self, ids: &[String]) -> Result<(), StorageError>;
}

/// SQLite-backed outbox entry store.
///
/// Holds no state beyond the pool and its collaborators, so clones can be
/// shared freely between writers and processors.
#[derive(Clone)]
pub struct Storage {
    pool: Pool,
    clock: Arc<dyn Clock>,
    id_generator: Arc<dyn IdGenerator>,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl Storage {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
            id_generator: Arc::new(UuidGenerator),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = id_generator;
        self
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        run_migrations(&self.pool).await
    }

    /// Insert `messages` as unclaimed entries inside `tx`.
    ///
    /// Nothing becomes claimable until the caller commits `tx`.
    #[instrument(skip_all, fields(count = messages.len()))]
    pub async fn enqueue_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        messages: &[Message],
    ) -> Result<(), StorageError> {
        if messages.is_empty() {
            return Ok(());
        }
        let now = self.clock.now();
        let rows: Vec<OutboxEntry> = messages
            .iter()
            .map(|m| OutboxEntry {
                id: self.id_generator.generate_id(now, m),
                namespace: m.namespace.clone(),
                key: m.key.clone(),
                payload: m.payload.clone(),
                processor_id: None,
                processing_deadline: None,
            })
            .collect();

        for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new(r#"INSERT INTO outbox_entries (id, namespace, "key", payload) "#);
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.id.as_str())
                    .push_bind(row.namespace.as_deref())
                    .push_bind(row.key.as_slice())
                    .push_bind(row.payload.as_slice());
            });
            qb.build().execute(&mut **tx).await?;
        }
        debug!(count = rows.len(), "enqueued outbox entries");
        Ok(())
    }

    /// Full row for `id`, claim bookkeeping included.
    #[instrument(skip_all, fields(state = tracing::field::Empty))]
    pub async fn get_entry(&self, id: &str) -> Result<Option<OutboxEntry>, StorageError> {
        let row = sqlx::query_as::<_, OutboxEntry>(
            r#"SELECT id, namespace, "key", payload, processor_id, processing_deadline
               FROM outbox_entries WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(entry) = &row {
            let state = entry.claim_state(self.clock.now());
            tracing::Span::current().record("state", state.as_str());
        }
        Ok(row)
    }

    #[instrument(skip_all)]
    pub async fn count_entries(&self) -> Result<i64, StorageError> {
        let cnt: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(cnt)
    }
}

#[async_trait]
impl ProcessorStorage for Storage {
    async fn enqueue(
        &self,
        txn: &mut (dyn Any + Send),
        messages: &[Message],
    ) -> Result<(), StorageError> {
        let tx = txn
            .downcast_mut::<Transaction<'static, Sqlite>>()
            .ok_or(StorageError::WrongTransaction)?;
        self.enqueue_tx(tx, messages).await
    }

    // A single UPDATE is the linearization point: SQLite serializes writers,
    // so no two processors can both match and take the same live row.
    #[instrument(skip_all, fields(processor_id = %processor_id))]
    async fn claim_entries(
        &self,
        processor_id: &str,
        claim_deadline: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        if processor_id.is_empty() {
            return Err(StorageError::EmptyProcessorId);
        }
        let now = self.clock.now();
        if claim_deadline <= now {
            return Err(StorageError::DeadlineNotInFuture {
                deadline: claim_deadline,
                now,
            });
        }

        let result = sqlx::query(
            r#"
            UPDATE outbox_entries
            SET processor_id = ?, processing_deadline = ?
            WHERE processor_id IS NULL
               OR processor_id = ''
               OR processor_id = ?
               OR processing_deadline IS NULL
               OR processing_deadline < ?
            "#,
        )
        .bind(processor_id)
        .bind(dt_to_ms(claim_deadline))
        .bind(processor_id)
        .bind(dt_to_ms(now))
        .execute(&self.pool)
        .await?;
        debug!(claimed = result.rows_affected(), "claimed outbox entries");
        Ok(())
    }

    #[instrument(skip_all, fields(processor_id = %processor_id, batch_size = batch_size))]
    async fn get_claimed_entries(
        &self,
        processor_id: &str,
        batch_size: usize,
    ) -> Result<Vec<ClaimedEntry>, StorageError> {
        let limit = i64::try_from(batch_size).unwrap_or(i64::MAX);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, ClaimedEntry>(
            r#"
            SELECT id, namespace, "key", payload
            FROM outbox_entries
            WHERE processor_id = ?
            ORDER BY rowid
            LIMIT ?
            "#,
        )
        .bind(processor_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[instrument(skip_all, fields(count = ids.len()))]
    async fn delete_entries(&self, ids: &[String]) -> Result<(), StorageError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for chunk in ids.chunks(DELETE_CHUNK_IDS) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("DELETE FROM outbox_entries WHERE id IN (");
            {
                let mut separated = qb.separated(", ");
                for id in chunk {
                    separated.push_bind(id.as_str());
                }
                separated.push_unseparated(")");
            }
            deleted += qb.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        debug!(deleted, "deleted outbox entries");
        Ok(())
    }
}
