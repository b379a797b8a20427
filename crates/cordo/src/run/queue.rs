//! In-memory run queue with atomic first-match claim.
//!
//! One mutex guards the whole table; every critical section is short and
//! never performs I/O or awaits. Session-store updates driven by queue
//! transitions happen in the run service, after the lock is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use tokio::sync::Notify;
use tokio::time::Instant;

use cordo_protocol::RunnerProfile;

use crate::clock;
use crate::error::{CoordError, CoordResult};
use crate::runner::RunnerRegistry;

use super::models::{Run, RunStatus};

#[derive(Default)]
struct QueueInner {
    runs: HashMap<String, Run>,
    /// session_id → run_id of the one non-terminal run per session.
    active_by_session: HashMap<String, String>,
}

impl QueueInner {
    /// Pending run ids in claim order: FIFO by `created_at`, ties broken by
    /// `run_id` ascending.
    fn pending_in_order(&self) -> Vec<String> {
        let mut pending: Vec<(&String, &String)> = self
            .runs
            .values()
            .filter(|r| r.status.is_pending())
            .map(|r| (&r.created_at, &r.run_id))
            .collect();
        pending.sort();
        pending.into_iter().map(|(_, id)| id.clone()).collect()
    }
}

/// The coordinator's work queue. Holds every non-terminal run plus recently
/// finished ones for inspection.
pub struct RunQueue {
    inner: Mutex<QueueInner>,
    registry: Arc<RunnerRegistry>,
    /// Fired when a new pending deadline appears; re-arms the no-match
    /// sweeper.
    sweep_signal: Notify,
}

impl RunQueue {
    pub fn new(registry: Arc<RunnerRegistry>) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            registry,
            sweep_signal: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a run in `pending` (or `pending_no_match` when no online runner
    /// currently satisfies its demands) and wake every matching runner.
    pub fn enqueue(&self, mut run: Run) -> CoordResult<Run> {
        let snapshot = {
            let mut inner = self.lock();

            if inner.active_by_session.contains_key(&run.session_id) {
                return Err(CoordError::ActiveRunExists(run.session_id));
            }

            run.status = if self.registry.any_online_match(&run.demands) {
                RunStatus::Pending
            } else {
                RunStatus::PendingNoMatch
            };

            inner
                .active_by_session
                .insert(run.session_id.clone(), run.run_id.clone());
            let snapshot = run.clone();
            inner.runs.insert(run.run_id.clone(), run);
            snapshot
        };

        debug!(
            "enqueued {} for {} as {}",
            snapshot.run_id, snapshot.session_id, snapshot.status
        );
        self.registry.wake_matching(&snapshot.demands);
        self.sweep_signal.notify_one();

        Ok(snapshot)
    }

    /// Atomically claim the first pending run this runner satisfies.
    pub fn claim_one(&self, runner_id: &str, profile: &RunnerProfile) -> Option<Run> {
        let mut inner = self.lock();

        for run_id in inner.pending_in_order() {
            let Some(run) = inner.runs.get_mut(&run_id) else {
                continue;
            };
            if !run.demands.satisfied_by(profile) {
                continue;
            }

            run.status = RunStatus::Claimed;
            run.runner_id = Some(runner_id.to_string());
            run.claimed_at = Some(clock::now_ts());
            info!("run {} claimed by {}", run.run_id, runner_id);
            return Some(run.clone());
        }

        None
    }

    /// `claimed → running`, reported by the claiming runner.
    pub fn report_started(&self, run_id: &str, runner_id: &str) -> CoordResult<Run> {
        let mut inner = self.lock();
        let run = get_held_run(&mut inner, run_id, runner_id)?;

        if !run.status.may_transition(RunStatus::Running) {
            return Err(CoordError::conflict(format!(
                "run {} cannot start from {}",
                run_id, run.status
            )));
        }

        run.status = RunStatus::Running;
        run.started_at = Some(clock::now_ts());
        Ok(run.clone())
    }

    /// Terminal transition reported by the claiming runner.
    pub fn complete(
        &self,
        run_id: &str,
        runner_id: &str,
        status: RunStatus,
        error: Option<String>,
    ) -> CoordResult<Run> {
        debug_assert!(status.is_terminal());

        let mut inner = self.lock();
        let run = get_held_run(&mut inner, run_id, runner_id)?;

        if !run.status.may_transition(status) {
            return Err(CoordError::conflict(format!(
                "run {} cannot move from {} to {}",
                run_id, run.status, status
            )));
        }

        run.status = status;
        run.completed_at = Some(clock::now_ts());
        run.retired_at = Some(Instant::now());
        run.error = error;
        let snapshot = run.clone();
        inner.active_by_session.remove(&snapshot.session_id);

        info!("run {} finished as {}", run_id, status);
        Ok(snapshot)
    }

    /// Move a session's active run to `stopping`. The run must already be
    /// held by a runner; unclaimed runs have no one to deliver a stop to.
    pub fn request_stop(&self, session_id: &str) -> CoordResult<Run> {
        let mut inner = self.lock();

        let run_id = inner
            .active_by_session
            .get(session_id)
            .cloned()
            .ok_or_else(|| {
                CoordError::not_found(format!("active run for session {}", session_id))
            })?;
        let run = inner
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| CoordError::not_found(format!("run {}", run_id)))?;

        if run.status == RunStatus::Stopping {
            return Ok(run.clone());
        }
        if !run.status.may_transition(RunStatus::Stopping) {
            return Err(CoordError::conflict(format!(
                "run {} cannot be stopped from {}",
                run.run_id, run.status
            )));
        }

        run.status = RunStatus::Stopping;
        info!("run {} moving to stopping", run.run_id);
        Ok(run.clone())
    }

    /// Safety net after the stop grace: force a still-`stopping` run to
    /// `stopped`. Returns the run when it was forced.
    pub fn force_stop(&self, run_id: &str) -> Option<Run> {
        let mut inner = self.lock();
        let run = inner.runs.get_mut(run_id)?;
        if run.status != RunStatus::Stopping {
            return None;
        }

        run.status = RunStatus::Stopped;
        run.completed_at = Some(clock::now_ts());
        run.retired_at = Some(Instant::now());
        let snapshot = run.clone();
        inner.active_by_session.remove(&snapshot.session_id);

        warn!(
            "run {} never reported back after stop; forced to stopped (runner {})",
            run_id,
            snapshot.runner_id.as_deref().unwrap_or("unknown")
        );
        Some(snapshot)
    }

    pub fn get(&self, run_id: &str) -> Option<Run> {
        self.lock().runs.get(run_id).cloned()
    }

    /// All runs for a session, oldest first.
    pub fn runs_for_session(&self, session_id: &str) -> Vec<Run> {
        let inner = self.lock();
        let mut runs: Vec<Run> = inner
            .runs
            .values()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| (&a.created_at, &a.run_id).cmp(&(&b.created_at, &b.run_id)));
        runs
    }

    pub fn active_for_session(&self, session_id: &str) -> Option<Run> {
        let inner = self.lock();
        let run_id = inner.active_by_session.get(session_id)?;
        inner.runs.get(run_id).cloned()
    }

    pub fn has_active(&self, session_id: &str) -> bool {
        self.lock().active_by_session.contains_key(session_id)
    }

    /// Expire pending runs whose no-match deadline has passed.
    pub fn expire_due(&self, now: Instant) -> Vec<Run> {
        let mut inner = self.lock();
        let mut expired = Vec::new();

        let due: Vec<String> = inner
            .runs
            .values()
            .filter(|r| r.status.is_pending() && r.expires_at <= now)
            .map(|r| r.run_id.clone())
            .collect();

        for run_id in due {
            if let Some(run) = inner.runs.get_mut(&run_id) {
                run.status = RunStatus::Failed;
                run.completed_at = Some(clock::now_ts());
                run.retired_at = Some(Instant::now());
                run.error = Some("no matching runner".to_string());
                let snapshot = run.clone();
                inner.active_by_session.remove(&snapshot.session_id);
                expired.push(snapshot);
            }
        }

        expired
    }

    /// Soonest no-match deadline among pending runs.
    pub fn next_pending_deadline(&self) -> Option<Instant> {
        self.lock()
            .runs
            .values()
            .filter(|r| r.status.is_pending())
            .map(|r| r.expires_at)
            .min()
    }

    /// Wait for a new pending deadline to appear.
    pub async fn sweep_rearmed(&self) {
        self.sweep_signal.notified().await;
    }

    /// Fail every run held by a runner whose record was removed.
    pub fn fail_for_runner(&self, runner_id: &str) -> Vec<Run> {
        let mut inner = self.lock();
        let mut failed = Vec::new();

        let held: Vec<String> = inner
            .runs
            .values()
            .filter(|r| {
                r.is_active()
                    && !r.status.is_pending()
                    && r.runner_id.as_deref() == Some(runner_id)
            })
            .map(|r| r.run_id.clone())
            .collect();

        for run_id in held {
            if let Some(run) = inner.runs.get_mut(&run_id) {
                run.status = RunStatus::Failed;
                run.completed_at = Some(clock::now_ts());
                run.retired_at = Some(Instant::now());
                run.error = Some(format!("runner {} was removed", runner_id));
                let snapshot = run.clone();
                inner.active_by_session.remove(&snapshot.session_id);
                failed.push(snapshot);
            }
        }

        failed
    }

    /// Drop terminal runs that finished before `cutoff`. Keeps the table
    /// bounded; sessions remain the durable record.
    pub fn prune_terminal(&self, cutoff: Instant) {
        let mut inner = self.lock();
        inner
            .runs
            .retain(|_, run| run.is_active() || run.retired_at.map(|t| t > cutoff).unwrap_or(true));
    }
}

fn get_held_run<'a>(
    inner: &'a mut QueueInner,
    run_id: &str,
    runner_id: &str,
) -> CoordResult<&'a mut Run> {
    let run = inner
        .runs
        .get_mut(run_id)
        .ok_or_else(|| CoordError::not_found(format!("run {}", run_id)))?;

    if run.runner_id.as_deref() != Some(runner_id) {
        return Err(CoordError::conflict(format!(
            "run {} is not held by runner {}",
            run_id, runner_id
        )));
    }
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    use cordo_protocol::{
        BlueprintKind, Demands, RegisterRequest, ResolvedBlueprint, RunPayload, RunType,
        RuntimeContext,
    };

    use crate::ids;

    fn test_registry_with(hostname: &str, tags: &[&str]) -> (Arc<RunnerRegistry>, String) {
        let registry = Arc::new(RunnerRegistry::new());
        let runner_id = registry.register(&RegisterRequest {
            hostname: hostname.to_string(),
            project_dir: "/work".into(),
            executor_type: "claude-code".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        });
        (registry, runner_id)
    }

    fn test_run(session_id: &str, demands: Demands) -> Run {
        let run_id = ids::new_run_id();
        Run {
            run_id: run_id.clone(),
            session_id: session_id.to_string(),
            run_type: RunType::StartSession,
            status: RunStatus::Pending,
            demands,
            payload: RunPayload {
                run_id: run_id.clone(),
                session_id: session_id.to_string(),
                run_type: RunType::StartSession,
                agent_name: "hello".into(),
                executor_session_id: None,
                blueprint: ResolvedBlueprint {
                    name: "hello".into(),
                    kind: BlueprintKind::Agent,
                    system_prompt: Some("hi".into()),
                    mcp_servers: None,
                    output_schema: None,
                    command: None,
                    parameter_strategy: None,
                    timeout_seconds: None,
                },
                parameters: serde_json::json!({"prompt": "hi"}),
                runtime: RuntimeContext {
                    session_id: session_id.to_string(),
                    run_id,
                    parent_session_id: None,
                },
            },
            runner_id: None,
            created_at: clock::now_ts(),
            claimed_at: None,
            started_at: None,
            completed_at: None,
            error: None,
            expires_at: Instant::now() + Duration::from_secs(300),
            retired_at: None,
        }
    }

    #[tokio::test]
    async fn second_active_run_per_session_is_rejected() {
        let (registry, _) = test_registry_with("alpha", &[]);
        let queue = RunQueue::new(registry);

        queue.enqueue(test_run("ses_a", Demands::default())).unwrap();
        let err = queue
            .enqueue(test_run("ses_a", Demands::default()))
            .unwrap_err();
        assert!(matches!(err, CoordError::ActiveRunExists(_)));

        // A different session is fine.
        queue.enqueue(test_run("ses_b", Demands::default())).unwrap();
    }

    #[tokio::test]
    async fn claim_is_fifo_by_creation() {
        let (registry, runner_id) = test_registry_with("alpha", &[]);
        let profile = registry.profile(&runner_id).unwrap();
        let queue = RunQueue::new(registry);

        let first = queue.enqueue(test_run("ses_a", Demands::default())).unwrap();
        let second = queue.enqueue(test_run("ses_b", Demands::default())).unwrap();

        assert_eq!(
            queue.claim_one(&runner_id, &profile).unwrap().run_id,
            first.run_id
        );
        assert_eq!(
            queue.claim_one(&runner_id, &profile).unwrap().run_id,
            second.run_id
        );
        assert!(queue.claim_one(&runner_id, &profile).is_none());
    }

    #[tokio::test]
    async fn claim_skips_unsatisfied_demands() {
        let (registry, runner_id) = test_registry_with("alpha", &[]);
        let profile = registry.profile(&runner_id).unwrap();
        let queue = RunQueue::new(registry);

        let gpu_only = Demands {
            tags: ["gpu".to_string()].into_iter().collect(),
            ..Default::default()
        };
        queue.enqueue(test_run("ses_gpu", gpu_only)).unwrap();
        let plain = queue.enqueue(test_run("ses_plain", Demands::default())).unwrap();

        let claimed = queue.claim_one(&runner_id, &profile).unwrap();
        assert_eq!(claimed.run_id, plain.run_id);
        assert!(queue.claim_one(&runner_id, &profile).is_none());
    }

    #[tokio::test]
    async fn no_online_match_enqueues_as_pending_no_match() {
        let (registry, _) = test_registry_with("alpha", &[]);
        let queue = RunQueue::new(registry);

        let gpu_only = Demands {
            tags: ["gpu".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let run = queue.enqueue(test_run("ses_a", gpu_only)).unwrap();
        assert_eq!(run.status, RunStatus::PendingNoMatch);

        let plain = queue.enqueue(test_run("ses_b", Demands::default())).unwrap();
        assert_eq!(plain.status, RunStatus::Pending);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_claims_never_double_claim() {
        let (registry, runner_id) = test_registry_with("alpha", &[]);
        let profile = registry.profile(&runner_id).unwrap();
        let queue = Arc::new(RunQueue::new(registry));

        const RUNS: usize = 5;
        const CLAIMERS: usize = 32;

        for i in 0..RUNS {
            queue
                .enqueue(test_run(&format!("ses_{i}"), Demands::default()))
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..CLAIMERS {
            let queue = queue.clone();
            let runner_id = runner_id.clone();
            let profile = profile.clone();
            handles.push(tokio::spawn(async move {
                queue.claim_one(&runner_id, &profile).map(|r| r.run_id)
            }));
        }

        let mut claimed = Vec::new();
        for handle in handles {
            if let Some(run_id) = handle.await.unwrap() {
                claimed.push(run_id);
            }
        }

        let distinct: HashSet<&String> = claimed.iter().collect();
        assert_eq!(claimed.len(), RUNS, "exactly K runs claimed");
        assert_eq!(distinct.len(), RUNS, "no run claimed twice");
    }

    #[tokio::test]
    async fn started_and_completed_enforce_holder_and_lattice() {
        let (registry, runner_id) = test_registry_with("alpha", &[]);
        let profile = registry.profile(&runner_id).unwrap();
        let queue = RunQueue::new(registry);

        let run = queue.enqueue(test_run("ses_a", Demands::default())).unwrap();
        queue.claim_one(&runner_id, &profile).unwrap();

        // Wrong holder.
        assert!(queue.report_started(&run.run_id, "lnch_other").is_err());

        let started = queue.report_started(&run.run_id, &runner_id).unwrap();
        assert_eq!(started.status, RunStatus::Running);
        assert!(started.started_at.is_some());

        // running → running is not a legal transition.
        assert!(queue.report_started(&run.run_id, &runner_id).is_err());

        let done = queue
            .complete(&run.run_id, &runner_id, RunStatus::Completed, None)
            .unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert!(!queue.has_active("ses_a"));

        // Terminal runs reject further reports.
        assert!(
            queue
                .complete(&run.run_id, &runner_id, RunStatus::Failed, None)
                .is_err()
        );
    }

    #[tokio::test]
    async fn expire_due_fails_only_overdue_pending_runs() {
        let (registry, _) = test_registry_with("alpha", &[]);
        let queue = RunQueue::new(registry);

        let mut overdue = test_run("ses_a", Demands::default());
        overdue.expires_at = Instant::now() - Duration::from_secs(1);
        let overdue = queue.enqueue(overdue).unwrap();
        queue.enqueue(test_run("ses_b", Demands::default())).unwrap();

        let expired = queue.expire_due(Instant::now());
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].run_id, overdue.run_id);
        assert_eq!(expired[0].status, RunStatus::Failed);
        assert!(!queue.has_active("ses_a"));
        assert!(queue.has_active("ses_b"));
    }

    #[tokio::test]
    async fn runner_removal_fails_held_runs() {
        let (registry, runner_id) = test_registry_with("alpha", &[]);
        let profile = registry.profile(&runner_id).unwrap();
        let queue = RunQueue::new(registry);

        let claimed = queue.enqueue(test_run("ses_a", Demands::default())).unwrap();
        queue.claim_one(&runner_id, &profile).unwrap();
        queue.enqueue(test_run("ses_pending", Demands::default())).unwrap();

        let failed = queue.fail_for_runner(&runner_id);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].run_id, claimed.run_id);
        // Pending runs are untouched; another runner may still claim them.
        assert!(queue.has_active("ses_pending"));
    }

    #[tokio::test]
    async fn stop_flow_with_safety_net() {
        let (registry, runner_id) = test_registry_with("alpha", &[]);
        let profile = registry.profile(&runner_id).unwrap();
        let queue = RunQueue::new(registry);

        let run = queue.enqueue(test_run("ses_a", Demands::default())).unwrap();

        // Nothing claimed yet: nothing to stop.
        assert!(queue.request_stop("ses_a").is_err());

        queue.claim_one(&runner_id, &profile).unwrap();
        queue.report_started(&run.run_id, &runner_id).unwrap();

        let stopping = queue.request_stop("ses_a").unwrap();
        assert_eq!(stopping.status, RunStatus::Stopping);

        // Idempotent while stopping.
        assert_eq!(
            queue.request_stop("ses_a").unwrap().status,
            RunStatus::Stopping
        );

        let forced = queue.force_stop(&run.run_id).unwrap();
        assert_eq!(forced.status, RunStatus::Stopped);
        assert!(!queue.has_active("ses_a"));

        // Already terminal: no second force.
        assert!(queue.force_stop(&run.run_id).is_none());
    }

    #[tokio::test]
    async fn prune_drops_old_terminal_runs_only() {
        let (registry, runner_id) = test_registry_with("alpha", &[]);
        let profile = registry.profile(&runner_id).unwrap();
        let queue = RunQueue::new(registry);

        let run = queue.enqueue(test_run("ses_a", Demands::default())).unwrap();
        queue.claim_one(&runner_id, &profile).unwrap();
        queue.report_started(&run.run_id, &runner_id).unwrap();
        queue
            .complete(&run.run_id, &runner_id, RunStatus::Completed, None)
            .unwrap();
        queue.enqueue(test_run("ses_b", Demands::default())).unwrap();

        queue.prune_terminal(Instant::now() + Duration::from_secs(1));
        assert!(queue.get(&run.run_id).is_none());
        assert!(queue.has_active("ses_b"));
    }
}
