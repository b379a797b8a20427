//! Application state shared across handlers.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::blueprint::BlueprintStore;
use crate::callback::CallbackProcessor;
use crate::config::CoordinatorConfig;
use crate::db::Database;
use crate::events::EventHub;
use crate::relation::RelationRepository;
use crate::run::{RunQueue, RunService};
use crate::runner::RunnerRegistry;
use crate::session::{SessionRepository, SessionService};
use crate::{run, runner};

/// Everything the handlers need, cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    pub runs: Arc<RunService>,
    pub sessions: SessionService,
    pub relations: RelationRepository,
    pub registry: Arc<RunnerRegistry>,
    pub hub: Arc<EventHub>,
    pub config: CoordinatorConfig,
}

impl AppState {
    /// Wire every subsystem together and spawn the background tasks
    /// (callback processor, no-match sweeper, runner lifecycle sweeper).
    ///
    /// Must be called from within a tokio runtime.
    pub fn initialize(db: &Database, config: &CoordinatorConfig) -> Self {
        let hub = Arc::new(EventHub::new());
        let sessions = SessionService::new(SessionRepository::new(db.pool().clone()), hub.clone());
        let relations = RelationRepository::new(db.pool().clone());

        let registry = Arc::new(RunnerRegistry::new());
        let queue = Arc::new(RunQueue::new(registry.clone()));
        let blueprints = BlueprintStore::new(&config.blueprints.root);

        let (callback_tx, callback_rx) = mpsc::unbounded_channel();
        let runs = Arc::new(RunService::new(
            queue,
            registry.clone(),
            sessions.clone(),
            blueprints,
            hub.clone(),
            callback_tx,
            config.queue.clone(),
        ));

        tokio::spawn(CallbackProcessor::new(runs.clone()).run(callback_rx));
        tokio::spawn(run::sweeper::run(runs.clone(), config.queue.clone()));
        tokio::spawn(runner::sweeper::run(
            registry.clone(),
            runs.clone(),
            config.runner.clone(),
        ));

        Self {
            runs,
            sessions,
            relations,
            registry,
            hub,
            config: config.clone(),
        }
    }
}
