//! Session service: orchestrates the session store and the event stream.
//!
//! All mutations funnel through here so every durable change is also visible
//! on the SSE stream, and so event appends for one session stay ordered.

use std::sync::Arc;

use anyhow::Context;
use dashmap::DashMap;
use log::{debug, info};
use serde_json::json;

use cordo_protocol::AppendEventRequest;

use crate::clock;
use crate::error::{CoordError, CoordResult};
use crate::events::{EventHub, FrameKind};

use super::models::{NewSession, Session, SessionEvent, SessionFilter, SessionStatus};
use super::repository::{BindOutcome, SessionRepository};

/// Service over the session store.
#[derive(Clone)]
pub struct SessionService {
    repo: SessionRepository,
    hub: Arc<EventHub>,
    /// Serializes event appends per session so subscribers observe strictly
    /// increasing sequences.
    append_locks: Arc<DashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionService {
    pub fn new(repo: SessionRepository, hub: Arc<EventHub>) -> Self {
        Self {
            repo,
            hub,
            append_locks: Arc::new(DashMap::new()),
        }
    }

    pub fn repository(&self) -> &SessionRepository {
        &self.repo
    }

    /// Create a session in `pending`. The parent, when given, must exist.
    pub async fn create(&self, new: NewSession) -> CoordResult<Session> {
        if let Some(parent) = &new.parent_session_id {
            if self.repo.get(parent).await?.is_none() {
                return Err(CoordError::validation(format!(
                    "parent session {} does not exist",
                    parent
                )));
            }
        }

        self.repo.create(&new).await?;
        let session = self.get(&new.session_id).await?;

        info!(
            "created session {} (agent={}, mode={})",
            session.session_id, session.agent_name, session.execution_mode
        );
        self.publish_session(FrameKind::SessionCreated, &session);

        Ok(session)
    }

    pub async fn get(&self, session_id: &str) -> CoordResult<Session> {
        self.repo
            .get(session_id)
            .await?
            .ok_or_else(|| CoordError::not_found(format!("session {}", session_id)))
    }

    pub async fn list(&self, filter: &SessionFilter) -> CoordResult<Vec<Session>> {
        Ok(self.repo.list(filter).await?)
    }

    pub async fn children(&self, session_id: &str) -> CoordResult<Vec<Session>> {
        // 404 for unknown parents rather than an empty list.
        self.get(session_id).await?;
        Ok(self.repo.children(session_id).await?)
    }

    /// One-shot executor binding; the affinity tuple is frozen here.
    pub async fn bind(
        &self,
        session_id: &str,
        executor_session_id: &str,
        executor_type: &str,
        hostname: &str,
        project_dir: &str,
    ) -> CoordResult<Session> {
        let outcome = self
            .repo
            .bind(
                session_id,
                executor_session_id,
                executor_type,
                hostname,
                project_dir,
            )
            .await?;

        match outcome {
            BindOutcome::Bound => {
                let session = self.get(session_id).await?;
                info!(
                    "bound session {} to executor {} on {}:{}",
                    session_id, executor_type, hostname, project_dir
                );
                self.publish_session(FrameKind::SessionUpdated, &session);
                Ok(session)
            }
            BindOutcome::AlreadyBound => Err(CoordError::AlreadyBound(session_id.to_string())),
            BindOutcome::NotFound => {
                Err(CoordError::not_found(format!("session {}", session_id)))
            }
        }
    }

    /// Append an event. The first event flips a `pending` session to
    /// `running`.
    pub async fn append_event(
        &self,
        session_id: &str,
        request: AppendEventRequest,
    ) -> CoordResult<SessionEvent> {
        let lock = self
            .append_locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let session = self.get(session_id).await?;
        if session.status == SessionStatus::Pending {
            self.set_status(session_id, SessionStatus::Running).await?;
        }

        let event = self
            .repo
            .append_event(
                session_id,
                &request.event_type,
                &request.payload,
                request.run_id.as_deref(),
                &clock::now_ts(),
            )
            .await?;

        let data = serde_json::to_value(&event).context("serializing session event")?;
        self.hub.publish(
            FrameKind::Event,
            Some(session_id),
            session.created_by.as_deref(),
            data,
        );
        debug!(
            "appended event {}#{} ({})",
            session_id, event.sequence, event.event_type
        );

        Ok(event)
    }

    pub async fn events_after(
        &self,
        session_id: &str,
        after_sequence: i64,
        limit: i64,
    ) -> CoordResult<Vec<SessionEvent>> {
        self.get(session_id).await?;
        Ok(self
            .repo
            .events_after(session_id, after_sequence, limit)
            .await?)
    }

    /// Non-terminal status change, broadcast as `session_updated`.
    pub async fn set_status(&self, session_id: &str, status: SessionStatus) -> CoordResult<()> {
        self.repo.update_status(session_id, status).await?;
        let session = self.get(session_id).await?;
        self.publish_session(FrameKind::SessionUpdated, &session);
        Ok(())
    }

    /// Terminal update with result or error, broadcast as `session_updated`.
    pub async fn finish(
        &self,
        session_id: &str,
        status: SessionStatus,
        result_text: Option<&str>,
        result_data: Option<&serde_json::Value>,
        error_kind: Option<&str>,
        error_message: Option<&str>,
    ) -> CoordResult<Session> {
        self.repo
            .finish(
                session_id,
                status,
                result_text,
                result_data,
                error_kind,
                error_message,
            )
            .await?;

        let session = self.get(session_id).await?;
        info!("session {} finished as {}", session_id, status);
        self.publish_session(FrameKind::SessionUpdated, &session);
        Ok(session)
    }

    pub async fn set_execution_mode(
        &self,
        session_id: &str,
        mode: crate::session::models::ExecutionMode,
    ) -> CoordResult<()> {
        Ok(self.repo.update_execution_mode(session_id, mode).await?)
    }

    pub async fn touch_resumed(&self, session_id: &str) -> CoordResult<()> {
        Ok(self
            .repo
            .touch_resumed(session_id, &clock::now_ts())
            .await?)
    }

    /// Admin cascade delete of the parent-child subtree.
    pub async fn delete_cascade(&self, session_id: &str) -> CoordResult<Vec<String>> {
        self.get(session_id).await?;
        let deleted = self.repo.cascade_delete(session_id).await?;

        for id in &deleted {
            self.append_locks.remove(id);
            self.hub.publish(
                FrameKind::SessionDeleted,
                Some(id),
                None,
                json!({"session_id": id}),
            );
        }
        info!(
            "cascade deleted {} session(s) rooted at {}",
            deleted.len(),
            session_id
        );

        Ok(deleted)
    }

    fn publish_session(&self, kind: FrameKind, session: &Session) {
        let data = serde_json::to_value(session).unwrap_or_else(|_| json!({}));
        self.hub.publish(
            kind,
            Some(&session.session_id),
            session.created_by.as_deref(),
            data,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::ids;
    use crate::session::models::ExecutionMode;
    use serde_json::json;

    async fn service() -> SessionService {
        let db = Database::in_memory().await.unwrap();
        SessionService::new(
            SessionRepository::new(db.pool().clone()),
            Arc::new(EventHub::new()),
        )
    }

    fn new_session(id: &str) -> NewSession {
        NewSession {
            session_id: id.to_string(),
            agent_name: "hello".into(),
            execution_mode: ExecutionMode::AsyncCallback,
            parent_session_id: None,
            created_by: Some("tester".into()),
            created_at: clock::now_ts(),
        }
    }

    #[tokio::test]
    async fn create_rejects_missing_parent() {
        let service = service().await;
        let mut new = new_session(&ids::new_session_id());
        new.parent_session_id = Some("ses_missing".into());

        let err = service.create(new).await.unwrap_err();
        assert!(matches!(err, CoordError::Validation(_)));
    }

    #[tokio::test]
    async fn first_event_flips_pending_to_running() {
        let service = service().await;
        service.create(new_session("ses_a")).await.unwrap();

        service
            .append_event(
                "ses_a",
                AppendEventRequest {
                    event_type: "message".into(),
                    payload: json!({"text": "hi"}),
                    run_id: None,
                },
            )
            .await
            .unwrap();

        let session = service.get("ses_a").await.unwrap();
        assert_eq!(session.status, SessionStatus::Running);
    }

    #[tokio::test]
    async fn bind_conflicts_surface_as_already_bound() {
        let service = service().await;
        service.create(new_session("ses_a")).await.unwrap();

        service
            .bind("ses_a", "U1", "claude-code", "alpha", "/work")
            .await
            .unwrap();
        let err = service
            .bind("ses_a", "U2", "claude-code", "alpha", "/work")
            .await
            .unwrap_err();
        assert!(matches!(err, CoordError::AlreadyBound(_)));
    }

    #[tokio::test]
    async fn event_frames_reach_subscribers_in_sequence_order() {
        let service = service().await;
        let mut rx = service.hub.subscribe();
        service.create(new_session("ses_a")).await.unwrap();

        for i in 0..3 {
            service
                .append_event(
                    "ses_a",
                    AppendEventRequest {
                        event_type: "message".into(),
                        payload: json!({"n": i}),
                        run_id: None,
                    },
                )
                .await
                .unwrap();
        }

        let mut last_sequence = 0;
        while let Ok(frame) = rx.try_recv() {
            if frame.kind == FrameKind::Event {
                let sequence = frame.data["sequence"].as_i64().unwrap();
                assert!(sequence > last_sequence);
                last_sequence = sequence;
            }
        }
        assert_eq!(last_sequence, 3);
    }
}
