use serde::{Deserialize, Serialize};

/// Introspection snapshot of a single queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub name: String,
    pub depth: u64,
    /// Scheduler credit; `None` if the scheduler has not observed the queue.
    pub deficit: Option<u64>,
    pub enqueued_total: u64,
}
