//! Transactional outbox storage on SQLite.
//!
//! Writers enqueue messages inside their own transaction; processors claim,
//! fetch, publish and delete them. See [`db::Storage`] for the claim protocol.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod id;
pub mod model;
pub mod outbox;

pub use clock::{Clock, FakeClock, SystemClock};
pub use db::{ClaimedEntry, OutboxEntry, ProcessorStorage, Storage};
pub use error::StorageError;
pub use id::{IdGenerator, TimeOrderedUuidGenerator, UuidGenerator};
pub use model::{ClaimState, Message};
