use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of work resident in a named queue. Encoded as JSON in the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueItem {
    pub id: Uuid,
    pub payload: String,
    /// Service cost of the item. Always >= 1.
    pub weight: u32,
    /// Unix epoch milliseconds.
    pub enqueued_at: u64,
}

impl QueueItem {
    /// Build a fresh item stamped with a UUIDv7 and the current wall-clock time.
    pub fn new(payload: impl Into<String>, weight: u32) -> Self {
        Self {
            id: Uuid::now_v7(),
            payload: payload.into(),
            weight: weight.max(1),
            enqueued_at: now_ms(),
        }
    }
}

/// An item handed to a consumer by the scheduler, together with the queue it
/// was taken from. Ownership of the item moves to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Dequeued {
    pub queue: String,
    pub item: QueueItem,
}

pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
