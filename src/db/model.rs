//! Row types for `outbox_entries`.
//!
//! Deadlines are stored as unix milliseconds so SQLite compares them as
//! integers.

use crate::model::ClaimState;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::FromRow;

/// Full persisted row, including claim bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct OutboxEntry {
    pub id: String,
    pub namespace: Option<String>,
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
    pub processor_id: Option<String>,
    /// Unix milliseconds.
    pub processing_deadline: Option<i64>,
}

impl OutboxEntry {
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.processing_deadline.and_then(ms_to_dt)
    }

    pub fn claim_state(&self, now: DateTime<Utc>) -> ClaimState {
        let owner = self.processor_id.as_deref().filter(|p| !p.is_empty());
        match (owner, self.processing_deadline) {
            (Some(_), Some(deadline)) if deadline > dt_to_ms(now) => ClaimState::ClaimedLive,
            (Some(_), Some(_)) => ClaimState::ClaimedExpired,
            _ => ClaimState::Unclaimed,
        }
    }
}

/// What a publisher needs from a claimed entry.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ClaimedEntry {
    pub id: String,
    pub namespace: Option<String>,
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
}

pub(crate) fn dt_to_ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub(crate) fn ms_to_dt(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}
