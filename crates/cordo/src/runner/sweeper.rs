//! Runner lifecycle sweeper.
//!
//! Flips heartbeatless runners to `stale`, removes long-silent records, and
//! fails the runs a removed runner was holding.

use std::sync::Arc;

use log::debug;

use crate::config::RunnerConfig;
use crate::run::RunService;

use super::registry::RunnerRegistry;

/// Run the sweeper until the process shuts down.
pub async fn run(registry: Arc<RunnerRegistry>, service: Arc<RunService>, config: RunnerConfig) {
    let mut tick = tokio::time::interval(config.sweep_interval());
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    debug!("runner lifecycle sweeper started");

    loop {
        tick.tick().await;

        let removed = registry.sweep(config.stale_after(), config.remove_after());
        for runner_id in removed {
            service.handle_runner_removed(&runner_id).await;
        }
    }
}
