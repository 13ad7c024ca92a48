use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The ambient transaction token is not a SQLite transaction.
    #[error("ambient transaction is not a sqlx SQLite transaction")]
    WrongTransaction,
    #[error("processor id must be non-empty")]
    EmptyProcessorId,
    #[error("claim deadline {deadline} is not after current time {now}")]
    DeadlineNotInFuture {
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}
