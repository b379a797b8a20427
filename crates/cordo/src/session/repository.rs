//! Session database repository.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::{NewSession, Session, SessionEvent, SessionFilter, SessionStatus};

/// Outcome of an executor-bind attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    Bound,
    AlreadyBound,
    NotFound,
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    agent_name: String,
    status: String,
    execution_mode: String,
    parent_session_id: Option<String>,
    created_by: Option<String>,
    executor_session_id: Option<String>,
    executor_type: Option<String>,
    hostname: Option<String>,
    project_dir: Option<String>,
    result_text: Option<String>,
    result_data: Option<String>,
    error_kind: Option<String>,
    error_message: Option<String>,
    created_at: String,
    last_resumed_at: Option<String>,
}

impl TryFrom<SessionRow> for Session {
    type Error = anyhow::Error;

    fn try_from(row: SessionRow) -> Result<Self> {
        let result_data = row
            .result_data
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .context("parsing stored result_data")?;

        Ok(Session {
            session_id: row.session_id,
            agent_name: row.agent_name,
            status: row.status.parse().map_err(anyhow::Error::msg)?,
            execution_mode: row.execution_mode.parse().map_err(anyhow::Error::msg)?,
            parent_session_id: row.parent_session_id,
            created_by: row.created_by,
            executor_session_id: row.executor_session_id,
            executor_type: row.executor_type,
            hostname: row.hostname,
            project_dir: row.project_dir,
            result_text: row.result_text,
            result_data,
            error_kind: row.error_kind,
            error_message: row.error_message,
            created_at: row.created_at,
            last_resumed_at: row.last_resumed_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    session_id: String,
    sequence: i64,
    event_type: String,
    payload: String,
    run_id: Option<String>,
    created_at: String,
}

impl TryFrom<EventRow> for SessionEvent {
    type Error = anyhow::Error;

    fn try_from(row: EventRow) -> Result<Self> {
        Ok(SessionEvent {
            session_id: row.session_id,
            sequence: row.sequence,
            event_type: row.event_type,
            payload: serde_json::from_str(&row.payload).context("parsing stored event payload")?,
            run_id: row.run_id,
            created_at: row.created_at,
        })
    }
}

const SESSION_COLUMNS: &str = r#"
    session_id, agent_name, status, execution_mode, parent_session_id, created_by,
    executor_session_id, executor_type, hostname, project_dir,
    result_text, result_data, error_kind, error_message,
    created_at, last_resumed_at
"#;

/// Repository for session persistence.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a fresh session with status `pending`.
    pub async fn create(&self, new: &NewSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (
                session_id, agent_name, status, execution_mode,
                parent_session_id, created_by, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.session_id)
        .bind(&new.agent_name)
        .bind(SessionStatus::Pending.to_string())
        .bind(new.execution_mode.to_string())
        .bind(&new.parent_session_id)
        .bind(&new.created_by)
        .bind(&new.created_at)
        .execute(&self.pool)
        .await
        .context("creating session")?;

        Ok(())
    }

    /// Get a session by id.
    pub async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = ?"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .context("fetching session")?;

        row.map(Session::try_from).transpose()
    }

    /// List sessions, optionally filtered by creator and/or parent.
    pub async fn list(&self, filter: &SessionFilter) -> Result<Vec<Session>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM sessions
            WHERE (?1 IS NULL OR created_by = ?1)
              AND (?2 IS NULL OR parent_session_id = ?2)
            ORDER BY created_at DESC
            "#
        ))
        .bind(&filter.created_by)
        .bind(&filter.parent)
        .fetch_all(&self.pool)
        .await
        .context("listing sessions")?;

        rows.into_iter().map(Session::try_from).collect()
    }

    /// Direct children of a session.
    pub async fn children(&self, session_id: &str) -> Result<Vec<Session>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM sessions
            WHERE parent_session_id = ?
            ORDER BY created_at ASC
            "#
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("listing session children")?;

        rows.into_iter().map(Session::try_from).collect()
    }

    /// Write-once executor binding. The conditional update only succeeds for
    /// a session that has never been bound.
    pub async fn bind(
        &self,
        session_id: &str,
        executor_session_id: &str,
        executor_type: &str,
        hostname: &str,
        project_dir: &str,
    ) -> Result<BindOutcome> {
        let updated = sqlx::query(
            r#"
            UPDATE sessions
            SET executor_session_id = ?, executor_type = ?, hostname = ?, project_dir = ?
            WHERE session_id = ? AND executor_session_id IS NULL
            "#,
        )
        .bind(executor_session_id)
        .bind(executor_type)
        .bind(hostname)
        .bind(project_dir)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .context("binding session")?;

        if updated.rows_affected() == 1 {
            return Ok(BindOutcome::Bound);
        }

        let exists: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM sessions WHERE session_id = ?")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await
                .context("checking session existence")?;

        Ok(if exists.is_some() {
            BindOutcome::AlreadyBound
        } else {
            BindOutcome::NotFound
        })
    }

    /// Single-row status update.
    pub async fn update_status(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        sqlx::query("UPDATE sessions SET status = ? WHERE session_id = ?")
            .bind(status.to_string())
            .bind(session_id)
            .execute(&self.pool)
            .await
            .context("updating session status")?;

        Ok(())
    }

    /// Terminal update: status plus result or error.
    pub async fn finish(
        &self,
        session_id: &str,
        status: SessionStatus,
        result_text: Option<&str>,
        result_data: Option<&serde_json::Value>,
        error_kind: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let result_data = result_data.map(|v| v.to_string());

        sqlx::query(
            r#"
            UPDATE sessions
            SET status = ?, result_text = ?, result_data = ?, error_kind = ?, error_message = ?
            WHERE session_id = ?
            "#,
        )
        .bind(status.to_string())
        .bind(result_text)
        .bind(result_data)
        .bind(error_kind)
        .bind(error_message)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .context("finishing session")?;

        Ok(())
    }

    /// Resume runs take a fresh execution mode per request; when one is
    /// supplied it becomes the session's recorded mode.
    pub async fn update_execution_mode(
        &self,
        session_id: &str,
        mode: crate::session::models::ExecutionMode,
    ) -> Result<()> {
        sqlx::query("UPDATE sessions SET execution_mode = ? WHERE session_id = ?")
            .bind(mode.to_string())
            .bind(session_id)
            .execute(&self.pool)
            .await
            .context("updating execution mode")?;

        Ok(())
    }

    /// Record a resume.
    pub async fn touch_resumed(&self, session_id: &str, ts: &str) -> Result<()> {
        sqlx::query("UPDATE sessions SET last_resumed_at = ? WHERE session_id = ?")
            .bind(ts)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .context("recording session resume")?;

        Ok(())
    }

    /// Append an event, allocating the next sequence number in the same
    /// statement. Caller must have verified the session exists.
    pub async fn append_event(
        &self,
        session_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
        run_id: Option<&str>,
        created_at: &str,
    ) -> Result<SessionEvent> {
        let (sequence,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO session_events (session_id, sequence, event_type, payload, run_id, created_at)
            SELECT ?1, COALESCE(MAX(sequence), 0) + 1, ?2, ?3, ?4, ?5
            FROM session_events WHERE session_id = ?1
            RETURNING sequence
            "#,
        )
        .bind(session_id)
        .bind(event_type)
        .bind(payload.to_string())
        .bind(run_id)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .context("appending session event")?;

        Ok(SessionEvent {
            session_id: session_id.to_string(),
            sequence,
            event_type: event_type.to_string(),
            payload: payload.clone(),
            run_id: run_id.map(str::to_string),
            created_at: created_at.to_string(),
        })
    }

    /// Page through a session's events in sequence order.
    pub async fn events_after(
        &self,
        session_id: &str,
        after_sequence: i64,
        limit: i64,
    ) -> Result<Vec<SessionEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT session_id, sequence, event_type, payload, run_id, created_at
            FROM session_events
            WHERE session_id = ? AND sequence > ?
            ORDER BY sequence ASC
            LIMIT ?
            "#,
        )
        .bind(session_id)
        .bind(after_sequence)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("listing session events")?;

        rows.into_iter().map(SessionEvent::try_from).collect()
    }

    /// Recursively delete the parent-child subtree rooted at `session_id`.
    ///
    /// Events and relations of every deleted session go with it; peers of
    /// non-parent-child relations survive. Returns the deleted ids, children
    /// before parents.
    pub async fn cascade_delete(&self, session_id: &str) -> Result<Vec<String>> {
        // Collect the subtree breadth-first, then delete in one transaction.
        let mut subtree = vec![session_id.to_string()];
        let mut frontier = vec![session_id.to_string()];
        while let Some(parent) = frontier.pop() {
            let children: Vec<(String,)> =
                sqlx::query_as("SELECT session_id FROM sessions WHERE parent_session_id = ?")
                    .bind(&parent)
                    .fetch_all(&self.pool)
                    .await
                    .context("collecting cascade subtree")?;
            for (child,) in children {
                subtree.push(child.clone());
                frontier.push(child);
            }
        }

        let mut tx = self.pool.begin().await.context("starting cascade delete")?;

        for id in &subtree {
            sqlx::query("DELETE FROM session_events WHERE session_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("deleting session events")?;
            sqlx::query(
                "DELETE FROM session_relations WHERE document_id = ? OR peer_document_id = ?",
            )
            .bind(id)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("deleting session relations")?;
        }

        // Children before parents to keep the self-referencing FK happy.
        for id in subtree.iter().rev() {
            sqlx::query("DELETE FROM sessions WHERE session_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("deleting session")?;
        }

        tx.commit().await.context("committing cascade delete")?;

        subtree.reverse();
        Ok(subtree)
    }
}
