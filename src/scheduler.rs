use crate::aggregator::FeedAggregator;
use crate::types::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Handle to a running periodic update loop. Owned by the process entry point;
/// dropping it without calling [`SchedulerHandle::stop`] detaches the task.
pub struct SchedulerHandle {
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn stop(self) -> Result<()> {
        let _ = self.cancel_tx.send(());
        self.join.await?;
        Ok(())
    }
}

/// Spawn the periodic bulk-update trigger. The first sweep runs after one full
/// interval; missed ticks are skipped rather than bursted.
pub fn spawn_update_loop(aggregator: Arc<FeedAggregator>, interval: Duration) -> SchedulerHandle {
    let (cancel_tx, mut cancel_rx) = broadcast::channel(1);
    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The interval fires immediately on the first tick; consume it so the
        // loop waits a full period before the first sweep.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel_rx.recv() => {
                    info!("update scheduler shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    match aggregator.update_all().await {
                        Ok(report) => info!(
                            succeeded = report.succeeded,
                            failed = report.failed,
                            new_items = report.new_items,
                            "scheduled sweep finished"
                        ),
                        Err(e) => warn!(error = %e, "scheduled sweep failed"),
                    }
                }
            }
        }
    });

    SchedulerHandle { cancel_tx, join }
}
