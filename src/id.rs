//! Entry id generation.
use crate::model::Message;
use chrono::{DateTime, Utc};
use uuid::{NoContext, Timestamp, Uuid};

/// Produces a globally unique id for each enqueued entry.
pub trait IdGenerator: Send + Sync {
    fn generate_id(&self, now: DateTime<Utc>, message: &Message) -> String;
}

/// Random UUIDv4 ids. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate_id(&self, _now: DateTime<Utc>, _message: &Message) -> String {
        Uuid::new_v4().to_string()
    }
}

/// UUIDv7 ids seeded from the enqueue time, so ids sort by creation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeOrderedUuidGenerator;

impl IdGenerator for TimeOrderedUuidGenerator {
    fn generate_id(&self, now: DateTime<Utc>, _message: &Message) -> String {
        let secs = now.timestamp().max(0) as u64;
        let ts = Timestamp::from_unix(NoContext, secs, now.timestamp_subsec_nanos());
        Uuid::new_v7(ts).to_string()
    }
}
