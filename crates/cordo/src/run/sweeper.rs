//! No-match expiry sweeper.
//!
//! A single task that sleeps until the soonest pending deadline, re-armed by
//! the queue whenever a new run is enqueued. Also prunes long-terminal runs
//! from the in-memory table.

use std::sync::Arc;

use log::debug;
use tokio::time::Instant;

use crate::config::QueueConfig;

use super::service::RunService;

/// Run the sweeper until the process shuts down.
pub async fn run(service: Arc<RunService>, config: QueueConfig) {
    let queue = service.queue().clone();
    debug!("no-match sweeper started");

    loop {
        match queue.next_pending_deadline() {
            Some(deadline) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = queue.sweep_rearmed() => continue,
                }
            }
            None => queue.sweep_rearmed().await,
        }

        for run in queue.expire_due(Instant::now()) {
            service.handle_no_match(&run).await;
        }

        let retention = config.terminal_retention();
        if let Some(cutoff) = Instant::now().checked_sub(retention) {
            queue.prune_terminal(cutoff);
        }
    }
}
