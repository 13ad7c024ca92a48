//! Database module: outbox entry rows and the SQL-backed entry store.
//!
//! - `model`: the persisted row and the projection handed to publishers.
//! - `repo`: pool setup, schema provisioning and [`Storage`], which owns every
//!   statement touching `outbox_entries`.
//!
//! The claim protocol lives in [`Storage::claim_entries`].

pub mod model;
pub mod repo;

pub use model::{ClaimedEntry, OutboxEntry};
pub use repo::*;
