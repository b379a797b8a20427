//! Background loop that turns child completions into parent resume runs.
//!
//! Completion notices arrive from the run layer for every terminal run. A
//! child in `ASYNC_CALLBACK` mode queues its result against its parent; the
//! queue drains into a single resume run the moment the parent is idle,
//! batching however many children completed while it was busy.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use cordo_protocol::RunType;

use crate::error::CoordError;
use crate::run::{CreateRunRequest, RunService};
use crate::session::{ExecutionMode, Session, SessionStatus};

use super::format;

/// Emitted by the run layer whenever a session's run reaches a terminal
/// status.
#[derive(Debug, Clone)]
pub struct CompletionNotice {
    pub session_id: String,
}

/// A completed child's result, queued for delivery to its parent.
#[derive(Debug, Clone)]
pub struct ChildResult {
    pub session_id: String,
    pub succeeded: bool,
    pub result_text: Option<String>,
    pub result_data: Option<Value>,
    pub error_message: Option<String>,
}

impl ChildResult {
    pub fn from_session(session: &Session) -> Self {
        Self {
            session_id: session.session_id.clone(),
            succeeded: session.status == SessionStatus::Finished,
            result_text: session.result_text.clone(),
            result_data: session.result_data.clone(),
            error_message: session.error_message.clone(),
        }
    }

    pub(super) fn result_body(&self) -> String {
        if let Some(text) = &self.result_text {
            return text.clone();
        }
        if let Some(data) = &self.result_data {
            return data.to_string();
        }
        String::new()
    }

    pub(super) fn error_body(&self) -> String {
        self.error_message
            .clone()
            .unwrap_or_else(|| "session did not complete".to_string())
    }
}

/// The processor itself: one background task plus a mutex-guarded pending
/// map.
pub struct CallbackProcessor {
    runs: Arc<RunService>,
    /// parent_session_id → children awaiting delivery.
    pending: Mutex<HashMap<String, Vec<ChildResult>>>,
}

impl CallbackProcessor {
    pub fn new(runs: Arc<RunService>) -> Arc<Self> {
        Arc::new(Self {
            runs,
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// Consume completion notices until the channel closes.
    pub async fn run(self: Arc<Self>, mut notices: mpsc::UnboundedReceiver<CompletionNotice>) {
        info!("callback processor started");
        while let Some(notice) = notices.recv().await {
            self.handle(notice).await;
        }
        info!("callback processor stopped");
    }

    async fn handle(&self, notice: CompletionNotice) {
        let session = match self.runs.sessions().get(&notice.session_id).await {
            Ok(session) => session,
            Err(err) => {
                // A cascade delete can race a completion; nothing to deliver.
                debug!("completion notice for {}: {}", notice.session_id, err);
                return;
            }
        };

        if session.status.is_terminal()
            && session.execution_mode == ExecutionMode::AsyncCallback
        {
            if let Some(parent) = session.parent_session_id.clone() {
                self.queue_for_parent(&parent, ChildResult::from_session(&session));
                self.try_deliver(&parent).await;
            }
        }

        // The completed session may itself be a parent whose children piled
        // up while it was busy.
        self.try_deliver(&notice.session_id).await;
    }

    fn queue_for_parent(&self, parent_id: &str, child: ChildResult) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        debug!(
            "queueing result of {} for parent {}",
            child.session_id, parent_id
        );
        pending
            .entry(parent_id.to_string())
            .or_default()
            .push(child);
    }

    /// Deliver this parent's pending children if it is idle. Enqueueing the
    /// resume re-checks idleness atomically under the run-queue lock; a lost
    /// race simply puts the children back.
    async fn try_deliver(&self, parent_id: &str) {
        let children = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            match pending.remove(parent_id) {
                Some(children) if !children.is_empty() => children,
                _ => return,
            }
        };

        if self.runs.queue().has_active(parent_id) {
            self.requeue(parent_id, children);
            return;
        }

        let prompt = if children.len() == 1 {
            format::single_child_message(&children[0])
        } else {
            format::aggregated_message(&children)
        };

        let request = CreateRunRequest {
            run_type: RunType::ResumeSession,
            agent_name: None,
            parameters: Some(json!({"prompt": prompt})),
            session_id: Some(parent_id.to_string()),
            parent_session_id: None,
            execution_mode: None,
            additional_demands: None,
            scope: None,
            created_by: None,
        };

        match self.runs.create_run(request).await {
            Ok(response) => {
                info!(
                    "delivered {} child result(s) to {} via run {}",
                    children.len(),
                    parent_id,
                    response.run_id
                );
            }
            Err(CoordError::ActiveRunExists(_)) => {
                debug!("parent {} became busy; re-queueing callbacks", parent_id);
                self.requeue(parent_id, children);
            }
            Err(err) => {
                // Terminal for this delivery; the children's results remain
                // on their session records.
                warn!("callback delivery to {} failed: {}", parent_id, err);
            }
        }
    }

    fn requeue(&self, parent_id: &str, mut children: Vec<ChildResult>) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let slot = pending.entry(parent_id.to_string()).or_default();
        children.append(slot);
        *slot = children;
    }
}
