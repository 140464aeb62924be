pub mod command;
pub mod config;
pub mod drr;
pub mod metrics;
mod scheduler;
pub mod stats;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::{BrokerError, BrokerResult, DequeueError, EnqueueError, StatsError};
use crate::item::{Dequeued, QueueItem};
use crate::store::Store;

pub use command::SchedulerCommand;
pub use config::FairgateConfig;
pub use metrics::Metrics;
pub use scheduler::{enqueue, WfqScheduler};
pub use stats::QueueStats;

/// The broker owns the scheduler task and the inbound command channel.
///
/// Producers enqueue straight into the store; dequeue and stats go through
/// the channel so the deficit table has exactly one owner.
pub struct Broker {
    store: Arc<dyn Store>,
    metrics: Arc<Metrics>,
    command_tx: mpsc::Sender<SchedulerCommand>,
    scheduler_task: Option<JoinHandle<()>>,
}

impl Broker {
    /// Spawn the scheduler on the current tokio runtime.
    #[tracing::instrument(skip_all, fields(quantum = config.scheduler.quantum))]
    pub fn new(config: &FairgateConfig, store: Arc<dyn Store>, metrics: Arc<Metrics>) -> Self {
        let (tx, rx) = mpsc::channel(config.scheduler.command_channel_capacity);
        let scheduler = WfqScheduler::new(store.clone(), &config.scheduler, metrics.clone());
        let handle = tokio::spawn(scheduler.run(rx));

        info!("broker started");

        Self {
            store,
            metrics,
            command_tx: tx,
            scheduler_task: Some(handle),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    #[tracing::instrument(skip_all, fields(queue = %queue))]
    pub async fn enqueue(
        &self,
        queue: &str,
        payload: String,
        weight: u32,
    ) -> Result<QueueItem, EnqueueError> {
        let item = enqueue(self.store.as_ref(), queue, payload, weight).await?;
        self.metrics.record_enqueue(queue);
        Ok(item)
    }

    /// Run one fair-scheduling round on the scheduler task.
    #[tracing::instrument(skip_all)]
    pub async fn dequeue(&self) -> Result<Option<Dequeued>, DequeueError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(SchedulerCommand::Dequeue { reply })?;
        let result = rx.await.map_err(|_| BrokerError::ChannelDisconnected)?;
        Ok(result?)
    }

    #[tracing::instrument(skip_all)]
    pub async fn stats(&self) -> Result<Vec<QueueStats>, StatsError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(SchedulerCommand::Stats { reply })?;
        let result = rx.await.map_err(|_| BrokerError::ChannelDisconnected)?;
        Ok(result?)
    }

    /// Send a command to the scheduler. Fails instead of waiting when the
    /// channel is full.
    fn send_command(&self, cmd: SchedulerCommand) -> BrokerResult<()> {
        self.command_tx.try_send(cmd).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BrokerError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => BrokerError::ChannelDisconnected,
        })
    }

    /// Stop the scheduler and wait for its task to finish.
    #[tracing::instrument(skip_all)]
    pub async fn shutdown(mut self) -> BrokerResult<()> {
        info!("initiating broker shutdown");

        // The task may already be gone; a closed channel is fine here.
        let _ = self.command_tx.send(SchedulerCommand::Shutdown).await;

        if let Some(handle) = self.scheduler_task.take() {
            handle.await.map_err(|_| BrokerError::SchedulerPanicked)?;
        }

        info!("broker shutdown complete");
        Ok(())
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        if self.scheduler_task.take().is_some() {
            let _ = self.command_tx.try_send(SchedulerCommand::Shutdown);
        }
    }
}
