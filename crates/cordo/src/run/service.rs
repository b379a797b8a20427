//! Run service: the pipeline from request to payload to terminal report.
//!
//! Creation loads the blueprint, validates parameters, merges demands,
//! resolves placeholders, persists the session, and enqueues the run.
//! Reports flow back through here so the session record and the event stream
//! stay in step with the queue.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;

use cordo_protocol::{
    BlueprintKind, CompleteRunRequest, Demands, PollMessage, RunOutcome, RunPayload, RunType,
    RuntimeContext, StopCommand,
};

use crate::blueprint::{BlueprintStore, PlaceholderContext, placeholder, schema};
use crate::callback::CompletionNotice;
use crate::clock;
use crate::config::QueueConfig;
use crate::error::{CoordError, CoordResult};
use crate::events::{EventHub, FrameKind};
use crate::ids;
use crate::runner::RunnerRegistry;
use crate::session::{ExecutionMode, NewSession, SessionService, SessionStatus};

use super::models::{Run, RunStatus};
use super::queue::RunQueue;

/// Body of `POST /runs`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRunRequest {
    #[serde(rename = "type")]
    pub run_type: RunType,

    /// Required for `start_session` and `execute_task`.
    #[serde(default)]
    pub agent_name: Option<String>,

    #[serde(default)]
    pub parameters: Option<Value>,

    /// Required for `resume_session`.
    #[serde(default)]
    pub session_id: Option<String>,

    /// Makes the new session a child of an existing one.
    #[serde(default)]
    pub parent_session_id: Option<String>,

    #[serde(default)]
    pub execution_mode: Option<ExecutionMode>,

    /// Extra constraints merged additively into the blueprint's demands.
    #[serde(default)]
    pub additional_demands: Option<Demands>,

    /// Per-run values for `${scope.*}` placeholders.
    #[serde(default)]
    pub scope: Option<Map<String, Value>>,

    /// Opaque creator tag recorded on the session.
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Response of `POST /runs`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateRunResponse {
    pub run_id: String,
    pub session_id: String,
}

/// Orchestrates run creation, dispatch, and terminal reporting.
pub struct RunService {
    queue: Arc<RunQueue>,
    registry: Arc<RunnerRegistry>,
    sessions: SessionService,
    blueprints: BlueprintStore,
    hub: Arc<EventHub>,
    callbacks: mpsc::UnboundedSender<CompletionNotice>,
    queue_config: QueueConfig,
}

impl RunService {
    pub fn new(
        queue: Arc<RunQueue>,
        registry: Arc<RunnerRegistry>,
        sessions: SessionService,
        blueprints: BlueprintStore,
        hub: Arc<EventHub>,
        callbacks: mpsc::UnboundedSender<CompletionNotice>,
        queue_config: QueueConfig,
    ) -> Self {
        Self {
            queue,
            registry,
            sessions,
            blueprints,
            hub,
            callbacks,
            queue_config,
        }
    }

    pub fn queue(&self) -> &Arc<RunQueue> {
        &self.queue
    }

    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Create a run: fresh session for `start_session`/`execute_task`, the
    /// named session for `resume_session`.
    pub async fn create_run(&self, request: CreateRunRequest) -> CoordResult<CreateRunResponse> {
        match request.run_type {
            RunType::StartSession | RunType::ExecuteTask => self.create_fresh(request).await,
            RunType::ResumeSession => self.create_resume(request).await,
        }
    }

    async fn create_fresh(&self, request: CreateRunRequest) -> CoordResult<CreateRunResponse> {
        let agent_name = request
            .agent_name
            .as_deref()
            .ok_or_else(|| CoordError::validation("agent_name is required"))?;

        let blueprint = self.blueprints.load(agent_name)?;
        match (blueprint.kind, request.run_type) {
            (BlueprintKind::Agent, RunType::StartSession)
            | (BlueprintKind::Deterministic, RunType::ExecuteTask) => {}
            (kind, run_type) => {
                return Err(CoordError::validation(format!(
                    "blueprint {} is {:?} and cannot serve a {} run",
                    agent_name, kind, run_type
                )));
            }
        }

        let parameters = request.parameters.clone().unwrap_or_else(|| json!({}));
        match (&blueprint.parameters_schema, blueprint.kind) {
            (Some(declared), _) => schema::validate_parameters(declared, &parameters)?,
            (None, BlueprintKind::Agent) => {
                schema::validate_parameters(schema::implicit_prompt_schema(), &parameters)?
            }
            (None, BlueprintKind::Deterministic) => {}
        }

        let session_id = ids::new_session_id();
        let run_id = ids::new_run_id();
        let demands = Demands::merge_additive(
            &blueprint.demands,
            request.additional_demands.as_ref().unwrap_or(&Demands::default()),
        );
        let runtime = RuntimeContext {
            session_id: session_id.clone(),
            run_id: run_id.clone(),
            parent_session_id: request.parent_session_id.clone(),
        };

        let payload = self.build_payload(
            &blueprint,
            request.run_type,
            &parameters,
            request.scope.as_ref(),
            None,
            runtime,
        )?;

        // Placeholders resolved; safe to persist the session and enqueue.
        self.sessions
            .create(NewSession {
                session_id: session_id.clone(),
                agent_name: agent_name.to_string(),
                execution_mode: request.execution_mode.unwrap_or(ExecutionMode::AsyncPoll),
                parent_session_id: request.parent_session_id.clone(),
                created_by: request.created_by.clone(),
                created_at: clock::now_ts(),
            })
            .await?;

        let run = self.new_run(run_id.clone(), session_id.clone(), request.run_type, demands, payload);
        self.queue.enqueue(run)?;

        info!("created {} run {} for session {}", request.run_type, run_id, session_id);
        Ok(CreateRunResponse { run_id, session_id })
    }

    async fn create_resume(&self, request: CreateRunRequest) -> CoordResult<CreateRunResponse> {
        let session_id = request
            .session_id
            .as_deref()
            .ok_or_else(|| CoordError::validation("session_id is required for resume_session"))?;

        let session = self.sessions.get(session_id).await?;
        let blueprint = self.blueprints.load(&session.agent_name)?;

        // Resume is conversational regardless of the blueprint's own schema.
        let parameters = request.parameters.clone().unwrap_or_else(|| json!({}));
        schema::validate_parameters(schema::implicit_prompt_schema(), &parameters)?;

        let mut demands = Demands::merge_additive(
            &blueprint.demands,
            request.additional_demands.as_ref().unwrap_or(&Demands::default()),
        );
        if let Some((hostname, project_dir, executor_type)) = session.affinity() {
            demands = demands.with_affinity(hostname, project_dir, executor_type);
        }

        let run_id = ids::new_run_id();
        let runtime = RuntimeContext {
            session_id: session_id.to_string(),
            run_id: run_id.clone(),
            parent_session_id: session.parent_session_id.clone(),
        };

        let payload = self.build_payload(
            &blueprint,
            RunType::ResumeSession,
            &parameters,
            request.scope.as_ref(),
            session.executor_session_id.clone(),
            runtime,
        )?;

        let run = self.new_run(
            run_id.clone(),
            session_id.to_string(),
            RunType::ResumeSession,
            demands,
            payload,
        );
        self.queue.enqueue(run)?;

        if let Some(mode) = request.execution_mode {
            if mode != session.execution_mode {
                self.sessions.set_execution_mode(session_id, mode).await?;
            }
        }
        self.sessions.touch_resumed(session_id).await?;

        info!("created resume run {} for session {}", run_id, session_id);
        Ok(CreateRunResponse {
            run_id,
            session_id: session_id.to_string(),
        })
    }

    fn build_payload(
        &self,
        blueprint: &crate::blueprint::Blueprint,
        run_type: RunType,
        parameters: &Value,
        scope: Option<&Map<String, Value>>,
        executor_session_id: Option<String>,
        runtime: RuntimeContext,
    ) -> CoordResult<RunPayload> {
        let empty_scope = Map::new();
        let ctx = PlaceholderContext {
            params: parameters,
            scope: scope.unwrap_or(&empty_scope),
            runtime: &runtime,
        };

        let template = serde_json::to_value(blueprint.to_resolved())
            .map_err(|e| CoordError::Internal(e.into()))?;
        let resolved = placeholder::resolve_value(&template, &ctx)?;
        let resolved_blueprint = serde_json::from_value(resolved)
            .map_err(|e| CoordError::Internal(e.into()))?;
        let resolved_parameters = placeholder::resolve_value(parameters, &ctx)?;

        Ok(RunPayload {
            run_id: runtime.run_id.clone(),
            session_id: runtime.session_id.clone(),
            run_type,
            agent_name: blueprint.name.clone(),
            executor_session_id,
            blueprint: resolved_blueprint,
            parameters: resolved_parameters,
            runtime,
        })
    }

    fn new_run(
        &self,
        run_id: String,
        session_id: String,
        run_type: RunType,
        demands: Demands,
        payload: RunPayload,
    ) -> Run {
        Run {
            run_id,
            session_id,
            run_type,
            status: RunStatus::Pending,
            demands,
            payload,
            runner_id: None,
            created_at: clock::now_ts(),
            claimed_at: None,
            started_at: None,
            completed_at: None,
            error: None,
            expires_at: Instant::now() + self.queue_config.no_match_ttl(),
            retired_at: None,
        }
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Long-poll for work: stop commands first, then a claimable run, else
    /// wait on the runner's wake signal until the deadline.
    pub async fn poll(&self, runner_id: &str, max_wait: Duration) -> CoordResult<Option<PollMessage>> {
        let entry = self
            .registry
            .get(runner_id)
            .ok_or_else(|| CoordError::not_found(format!("runner {}", runner_id)))?;
        let profile = entry.profile();

        let max_wait = max_wait.min(self.queue_config.long_poll_max_wait());
        let deadline = Instant::now() + max_wait;

        loop {
            if let Some(stop) = self.registry.pop_stop(runner_id) {
                return Ok(Some(PollMessage::Stop(stop)));
            }
            if let Some(run) = self.queue.claim_one(runner_id, &profile) {
                return Ok(Some(PollMessage::Run(run.payload)));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }

            tokio::select! {
                _ = entry.notified() => {}
                _ = tokio::time::sleep_until(deadline) => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------

    /// `claimed → running`, and the session follows.
    pub async fn report_started(&self, run_id: &str, runner_id: &str) -> CoordResult<Run> {
        let run = self.queue.report_started(run_id, runner_id)?;
        self.sessions
            .set_status(&run.session_id, SessionStatus::Running)
            .await?;
        Ok(run)
    }

    /// Terminal report from the claiming runner.
    pub async fn report_completed(
        &self,
        run_id: &str,
        runner_id: &str,
        report: CompleteRunRequest,
    ) -> CoordResult<Run> {
        if report.result_text.is_some() && report.result_data.is_some() {
            return Err(CoordError::validation(
                "result_text and result_data are mutually exclusive",
            ));
        }

        let run = self.queue.complete(
            run_id,
            runner_id,
            RunStatus::from(report.status),
            report.error.clone(),
        )?;

        let (session_status, error_kind) = match report.status {
            RunOutcome::Completed => (SessionStatus::Finished, None),
            RunOutcome::Stopped => (SessionStatus::Stopped, None),
            RunOutcome::Failed if report.output_schema_violation => {
                (SessionStatus::Error, Some("OutputSchemaValidationError"))
            }
            RunOutcome::Failed => (SessionStatus::Error, None),
        };

        let session = self
            .sessions
            .finish(
                &run.session_id,
                session_status,
                report.result_text.as_deref(),
                report.result_data.as_ref(),
                error_kind,
                report.error.as_deref(),
            )
            .await?;

        if report.status == RunOutcome::Failed {
            self.hub.publish(
                FrameKind::RunFailed,
                Some(&run.session_id),
                session.created_by.as_deref(),
                json!({
                    "run_id": run.run_id,
                    "session_id": run.session_id,
                    "error": report.error,
                }),
            );
        }

        self.notify_completion(&run.session_id);
        Ok(run)
    }

    /// Move a session's active run to `stopping`, signal the owning runner,
    /// and arm the safety net.
    pub async fn stop_session(&self, session_id: &str) -> CoordResult<Run> {
        let run = self.queue.request_stop(session_id)?;

        let runner_id = run
            .runner_id
            .clone()
            .unwrap_or_default();
        self.registry.push_stop(
            &runner_id,
            StopCommand {
                run_id: run.run_id.clone(),
                session_id: session_id.to_string(),
            },
        );

        // Safety net: if the runner never reports back, the run is declared
        // stopped after the grace window.
        let queue = self.queue.clone();
        let sessions = self.sessions.clone();
        let callbacks = self.callbacks.clone();
        let grace = self.queue_config.stop_grace();
        let run_id = run.run_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(orphan) = queue.force_stop(&run_id) {
                warn!(
                    "stop safety net fired for run {} (session {})",
                    orphan.run_id, orphan.session_id
                );
                if let Err(err) = sessions
                    .finish(&orphan.session_id, SessionStatus::Stopped, None, None, None, None)
                    .await
                {
                    warn!("failed to finish orphaned session: {err}");
                }
                let _ = callbacks.send(CompletionNotice {
                    session_id: orphan.session_id,
                });
            }
        });

        Ok(run)
    }

    // ------------------------------------------------------------------
    // Background failure paths
    // ------------------------------------------------------------------

    /// A pending run expired without a matching runner.
    pub async fn handle_no_match(&self, run: &Run) {
        let error = CoordError::NoMatchingRunner(run.run_id.clone());
        warn!("{}", error);

        match self
            .sessions
            .finish(
                &run.session_id,
                SessionStatus::Error,
                None,
                None,
                Some(error.kind()),
                Some(&error.to_string()),
            )
            .await
        {
            Ok(session) => {
                self.hub.publish(
                    FrameKind::RunFailed,
                    Some(&run.session_id),
                    session.created_by.as_deref(),
                    json!({
                        "run_id": run.run_id,
                        "session_id": run.session_id,
                        "error_kind": error.kind(),
                    }),
                );
            }
            Err(err) => warn!("failed to record no-match expiry: {err}"),
        }

        self.notify_completion(&run.session_id);
    }

    /// A runner's record was removed; fail everything it held.
    pub async fn handle_runner_removed(&self, runner_id: &str) {
        for run in self.queue.fail_for_runner(runner_id) {
            let error = CoordError::RunnerLost {
                runner_id: runner_id.to_string(),
                run_id: run.run_id.clone(),
            };
            warn!("{}", error);

            match self
                .sessions
                .finish(
                    &run.session_id,
                    SessionStatus::Error,
                    None,
                    None,
                    Some(error.kind()),
                    Some(&error.to_string()),
                )
                .await
            {
                Ok(session) => {
                    self.hub.publish(
                        FrameKind::RunFailed,
                        Some(&run.session_id),
                        session.created_by.as_deref(),
                        json!({
                            "run_id": run.run_id,
                            "session_id": run.session_id,
                            "error_kind": error.kind(),
                        }),
                    );
                }
                Err(err) => warn!("failed to record runner loss: {err}"),
            }

            self.notify_completion(&run.session_id);
        }
    }

    fn notify_completion(&self, session_id: &str) {
        let notice = CompletionNotice {
            session_id: session_id.to_string(),
        };
        if self.callbacks.send(notice).is_err() {
            warn!("callback processor is gone; completion notice dropped");
        }
    }
}
