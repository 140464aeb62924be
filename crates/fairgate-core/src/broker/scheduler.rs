use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::broker::command::SchedulerCommand;
use crate::broker::config::SchedulerConfig;
use crate::broker::drr::DeficitTable;
use crate::broker::metrics::Metrics;
use crate::broker::stats::QueueStats;
use crate::error::{EnqueueError, StoreError, StoreResult};
use crate::item::{Dequeued, QueueItem};
use crate::store::{keys, Store};

/// Append an item to a named queue. Does not touch any scheduler state, so
/// producers call it directly; list append is atomic at the store level.
///
/// The per-queue enqueue counter is best-effort: once the item is in the
/// store, a counter failure is logged rather than reported, so callers do
/// not retry an enqueue that already happened.
pub async fn enqueue(
    store: &dyn Store,
    queue: &str,
    payload: String,
    weight: u32,
) -> Result<QueueItem, EnqueueError> {
    keys::validate_queue_name(queue).map_err(EnqueueError::InvalidQueueName)?;
    if weight == 0 {
        return Err(EnqueueError::InvalidWeight);
    }

    let item = QueueItem::new(payload, weight);
    let encoded = serde_json::to_string(&item).map_err(StoreError::from)?;
    let depth = store.push_back(&keys::queue_key(queue), &encoded).await?;

    if let Err(e) = store.increment(&keys::enqueued_counter_key(queue)).await {
        warn!(queue, error = %e, "failed to bump enqueue counter");
    }

    debug!(queue, item_id = %item.id, weight, depth, "item enqueued");
    Ok(item)
}

/// Weighted fair queue scheduler: Deficit Round Robin over the named queues
/// found in the store.
///
/// The deficit table lives in this struct, so fairness holds per scheduler
/// instance. Several instances sharing one store each keep their own view
/// and only approximate global fairness.
// TODO(cluster): move deficits into the store with atomic INCRBY/DECRBY, or
// elect a single scheduling leader, before running more than one instance.
pub struct WfqScheduler {
    store: Arc<dyn Store>,
    deficits: DeficitTable,
    /// Static fallback list, for stores whose scan misses idle queues.
    seed_queues: Vec<String>,
    metrics: Arc<Metrics>,
}

impl WfqScheduler {
    pub fn new(store: Arc<dyn Store>, config: &SchedulerConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            deficits: DeficitTable::new(config.quantum),
            seed_queues: config.seed_queues.clone(),
            metrics,
        }
    }

    /// Append an item to `queue`. See [`enqueue`].
    pub async fn enqueue(
        &self,
        queue: &str,
        payload: impl Into<String>,
        weight: u32,
    ) -> Result<QueueItem, EnqueueError> {
        let item = enqueue(self.store.as_ref(), queue, payload.into(), weight).await?;
        self.metrics.record_enqueue(queue);
        Ok(item)
    }

    /// Current deficit of a queue, if the scheduler has observed it.
    pub fn deficit(&self, queue: &str) -> Option<u64> {
        self.deficits.deficit(queue)
    }

    /// Scan the store for queues and start tracking any not seen before.
    /// New queues are added in name order so the round-robin order is
    /// deterministic.
    async fn discover(&mut self) -> StoreResult<()> {
        let listed = self.store.list_keys(keys::QUEUE_KEY_PREFIX).await?;
        let mut names: Vec<String> = listed
            .iter()
            .filter_map(|k| keys::queue_name_from_key(k))
            .map(str::to_string)
            .chain(self.seed_queues.iter().cloned())
            .filter(|name| !self.deficits.is_tracked(name))
            .collect();
        names.sort();
        names.dedup();

        for name in names {
            self.deficits.track(&name);
            debug!(queue = %name, "scheduler tracking new queue");
        }
        Ok(())
    }

    /// Run one fair-scheduling round.
    ///
    /// Visits tracked queues starting after the last one served. Each
    /// non-empty queue is credited one quantum and its head item popped; if
    /// the deficit covers the item's weight the item is returned, otherwise
    /// it goes back to the head of its queue and the pass moves on. Returns
    /// `None` when no queue could afford its head item this pass.
    pub async fn dequeue(&mut self) -> StoreResult<Option<Dequeued>> {
        self.discover().await?;
        if self.deficits.is_empty() {
            self.metrics.record_round(false);
            return Ok(None);
        }

        for queue in self.deficits.round_order() {
            let key = keys::queue_key(&queue);
            let Some((raw, item)) = self.pop_head(&queue, &key).await? else {
                self.deficits.reset(&queue);
                continue;
            };

            self.deficits.credit(&queue);
            if self.deficits.try_consume(&queue, item.weight) {
                let deficit = self.deficits.deficit(&queue).unwrap_or(0);
                self.metrics.record_dequeue(&queue, deficit);
                self.metrics.record_round(true);
                debug!(queue = %queue, item_id = %item.id, weight = item.weight, deficit, "item dequeued");
                return Ok(Some(Dequeued { queue, item }));
            }

            if let Err(e) = self.store.push_front(&key, &raw).await {
                error!(
                    queue = %queue,
                    item_id = %item.id,
                    error = %e,
                    "failed to return item to queue head, item lost"
                );
                return Err(e);
            }
            let deficit = self.deficits.deficit(&queue).unwrap_or(0);
            self.metrics.set_deficit(&queue, deficit);
            debug!(queue = %queue, weight = item.weight, deficit, "head item not yet affordable");
        }

        self.metrics.record_round(false);
        Ok(None)
    }

    /// Pop the oldest decodable entry of a queue. Undecodable entries are
    /// moved to the queue's dead-letter list so they cannot wedge it.
    async fn pop_head(&self, queue: &str, key: &str) -> StoreResult<Option<(String, QueueItem)>> {
        while let Some(raw) = self.store.pop_front(key).await? {
            match serde_json::from_str::<QueueItem>(&raw) {
                Ok(item) => return Ok(Some((raw, item))),
                Err(e) => {
                    warn!(queue, error = %e, "undecodable queue entry moved to dead-letter list");
                    self.metrics.record_dead_letter(queue);
                    self.store
                        .push_back(&keys::dead_letter_key(queue), &raw)
                        .await?;
                }
            }
        }
        Ok(None)
    }

    /// Put back an item whose requester went away before the reply: it
    /// returns to the head of its queue and the queue gets its weight back.
    async fn requeue_undelivered(&mut self, dequeued: Dequeued) {
        let Dequeued { queue, item } = dequeued;
        let encoded = match serde_json::to_string(&item) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(queue = %queue, item_id = %item.id, error = %e, "failed to encode undelivered item, item lost");
                return;
            }
        };
        if let Err(e) = self.store.push_front(&keys::queue_key(&queue), &encoded).await {
            error!(queue = %queue, item_id = %item.id, error = %e, "failed to requeue undelivered item, item lost");
            return;
        }
        self.deficits.refund(&queue, item.weight);
        warn!(queue = %queue, item_id = %item.id, "dequeue requester gone, item returned to queue head");
    }

    /// Depth, deficit and enqueue count for every known queue.
    pub async fn stats(&mut self) -> StoreResult<Vec<QueueStats>> {
        self.discover().await?;

        let mut stats = Vec::with_capacity(self.deficits.len());
        for name in self.deficits.queue_names() {
            let depth = self.store.len(&keys::queue_key(name)).await?;
            let enqueued_total = self
                .store
                .get(&keys::enqueued_counter_key(name))
                .await?
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
            self.metrics.set_queue_depth(name, depth);
            stats.push(QueueStats {
                name: name.clone(),
                depth,
                deficit: self.deficits.deficit(name),
                enqueued_total,
            });
        }
        Ok(stats)
    }

    /// Process commands until `Shutdown` arrives or every sender is dropped.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<SchedulerCommand>) {
        info!(quantum = self.deficits.quantum(), "scheduler started");

        while let Some(cmd) = inbound.recv().await {
            match cmd {
                SchedulerCommand::Dequeue { reply } => {
                    let result = self.dequeue().await;
                    if let Err(e) = &result {
                        warn!(error = %e, "dequeue round failed");
                    }
                    if let Err(Ok(Some(undelivered))) = reply.send(result) {
                        self.requeue_undelivered(undelivered).await;
                    }
                }
                SchedulerCommand::Stats { reply } => {
                    let _ = reply.send(self.stats().await);
                }
                SchedulerCommand::Shutdown => break,
            }
        }

        info!("scheduler stopped");
    }
}
