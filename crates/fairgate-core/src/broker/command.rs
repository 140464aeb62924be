use tokio::sync::oneshot;

use crate::broker::stats::QueueStats;
use crate::error::StoreError;
use crate::item::Dequeued;

/// Commands sent from request handlers to the scheduler task.
///
/// Each variant that expects a response carries a `oneshot::Sender` for the
/// reply.
pub enum SchedulerCommand {
    Dequeue {
        reply: oneshot::Sender<Result<Option<Dequeued>, StoreError>>,
    },
    Stats {
        reply: oneshot::Sender<Result<Vec<QueueStats>, StoreError>>,
    },
    Shutdown,
}
