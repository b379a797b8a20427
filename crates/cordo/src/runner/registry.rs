//! In-memory runner registry.
//!
//! Each entry owns its record, a wake signal for the long-poll loop, and a
//! queue of pending stop commands. The wake signal has at-most-one stored
//! permit (`Notify::notify_one`), so repeated fires before the runner polls
//! collapse into a single wakeup.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use dashmap::DashMap;
use log::{debug, info, warn};
use tokio::sync::Notify;

use cordo_protocol::{Demands, RegisterRequest, RunnerProfile, StopCommand};

use crate::error::{CoordError, CoordResult};
use crate::ids;

use super::models::{Runner, RunnerStatus};

/// One registered runner and its signalling state.
pub struct RunnerEntry {
    record: Mutex<Runner>,
    wake: Notify,
    stop_queue: Mutex<VecDeque<StopCommand>>,
}

impl RunnerEntry {
    /// Snapshot of the runner record.
    pub fn runner(&self) -> Runner {
        self.record.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn profile(&self) -> RunnerProfile {
        self.runner().profile()
    }

    /// Wait for the next wake signal. Consumes a stored permit immediately
    /// when one exists.
    pub async fn notified(&self) {
        self.wake.notified().await;
    }
}

/// Registry of all known runners, keyed by derived id.
pub struct RunnerRegistry {
    entries: DashMap<String, Arc<RunnerEntry>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Upsert a runner from its identity tuple. Re-registration from the
    /// same tuple updates tags and liveness on the existing record. Either
    /// way the runner's wake signal fires so pending runs that now match are
    /// picked up immediately.
    pub fn register(&self, request: &RegisterRequest) -> String {
        let runner_id =
            ids::derive_runner_id(&request.hostname, &request.project_dir, &request.executor_type);
        let now = Utc::now();

        let entry = self
            .entries
            .entry(runner_id.clone())
            .or_insert_with(|| {
                info!(
                    "registering runner {} ({}:{}, {})",
                    runner_id, request.hostname, request.project_dir, request.executor_type
                );
                Arc::new(RunnerEntry {
                    record: Mutex::new(Runner {
                        runner_id: runner_id.clone(),
                        hostname: request.hostname.clone(),
                        project_dir: request.project_dir.clone(),
                        executor_type: request.executor_type.clone(),
                        tags: request.tags.clone(),
                        status: RunnerStatus::Online,
                        registered_at: now,
                        last_heartbeat_at: now,
                    }),
                    wake: Notify::new(),
                    stop_queue: Mutex::new(VecDeque::new()),
                })
            })
            .clone();

        {
            let mut record = entry.record.lock().unwrap_or_else(|e| e.into_inner());
            record.tags = request.tags.clone();
            record.status = RunnerStatus::Online;
            record.last_heartbeat_at = now;
        }
        entry.wake.notify_one();

        runner_id
    }

    pub fn get(&self, runner_id: &str) -> Option<Arc<RunnerEntry>> {
        self.entries.get(runner_id).map(|e| e.clone())
    }

    pub fn profile(&self, runner_id: &str) -> Option<RunnerProfile> {
        self.get(runner_id).map(|e| e.profile())
    }

    pub fn list(&self) -> Vec<Runner> {
        let mut runners: Vec<Runner> = self.entries.iter().map(|e| e.runner()).collect();
        runners.sort_by(|a, b| a.runner_id.cmp(&b.runner_id));
        runners
    }

    /// Refresh liveness; flips `stale` back to `online`.
    pub fn heartbeat(&self, runner_id: &str) -> CoordResult<()> {
        let entry = self
            .get(runner_id)
            .ok_or_else(|| CoordError::not_found(format!("runner {}", runner_id)))?;

        let mut record = entry.record.lock().unwrap_or_else(|e| e.into_inner());
        record.last_heartbeat_at = Utc::now();
        if record.status == RunnerStatus::Stale {
            info!("runner {} recovered from stale", runner_id);
            record.status = RunnerStatus::Online;
        }
        Ok(())
    }

    /// Fire the wake signal of every runner whose profile satisfies
    /// `demands`.
    pub fn wake_matching(&self, demands: &Demands) {
        for entry in self.entries.iter() {
            if demands.satisfied_by(&entry.profile()) {
                entry.wake.notify_one();
            }
        }
    }

    /// Is any online runner able to satisfy `demands` right now?
    pub fn any_online_match(&self, demands: &Demands) -> bool {
        self.entries.iter().any(|entry| {
            let runner = entry.runner();
            runner.status == RunnerStatus::Online && demands.satisfied_by(&runner.profile())
        })
    }

    /// Queue a stop command for delivery on the runner's next poll and wake
    /// it. Returns false for unknown runners.
    pub fn push_stop(&self, runner_id: &str, command: StopCommand) -> bool {
        let Some(entry) = self.get(runner_id) else {
            warn!(
                "dropping stop for run {}: runner {} is not registered",
                command.run_id, runner_id
            );
            return false;
        };

        entry
            .stop_queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(command);
        entry.wake.notify_one();
        true
    }

    /// Take the next pending stop command for a runner, if any.
    pub fn pop_stop(&self, runner_id: &str) -> Option<StopCommand> {
        let entry = self.get(runner_id)?;
        let command = entry
            .stop_queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        if let Some(cmd) = &command {
            debug!("delivering stop for run {} to {}", cmd.run_id, runner_id);
        }
        command
    }

    /// Lifecycle sweep: flip silent runners to `stale`, delete long-silent
    /// records. Returns the ids of removed runners so the caller can fail
    /// their in-flight runs.
    pub fn sweep(&self, stale_after: Duration, remove_after: Duration) -> Vec<String> {
        let now = Utc::now();
        let mut removed = Vec::new();

        for entry in self.entries.iter() {
            let mut record = entry.record.lock().unwrap_or_else(|e| e.into_inner());
            let silence = now - record.last_heartbeat_at;

            if silence >= remove_after {
                removed.push(record.runner_id.clone());
            } else if silence >= stale_after && record.status == RunnerStatus::Online {
                warn!(
                    "runner {} is stale ({}s without heartbeat)",
                    record.runner_id,
                    silence.num_seconds()
                );
                record.status = RunnerStatus::Stale;
            }
        }

        for runner_id in &removed {
            info!("removing runner {} (heartbeat timeout)", runner_id);
            self.entries.remove(runner_id);
        }

        removed
    }
}

impl Default for RunnerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
