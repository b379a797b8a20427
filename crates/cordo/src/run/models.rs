//! Run data models.

use serde::Serialize;
use tokio::time::Instant;

use cordo_protocol::{Demands, RunOutcome, RunPayload, RunType};

/// Run status. Transitions are monotonic along
/// `pending → (pending_no_match →)? claimed → running → terminal`, with
/// `stopping` optionally interposed on the active path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    /// Pending, and no online runner satisfied the demands at enqueue time.
    /// Still claimable; purely informational.
    PendingNoMatch,
    Claimed,
    Running,
    Stopping,
    Completed,
    Failed,
    Stopped,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Stopped
        )
    }

    pub fn is_pending(self) -> bool {
        matches!(self, RunStatus::Pending | RunStatus::PendingNoMatch)
    }

    /// Is `next` a legal direct successor of `self`?
    pub fn may_transition(self, next: RunStatus) -> bool {
        use RunStatus::*;
        match self {
            Pending => matches!(next, PendingNoMatch | Claimed | Failed),
            PendingNoMatch => matches!(next, Pending | Claimed | Failed),
            // A claimed run can fail without ever starting (runner lost) or
            // be told to stop before the started report arrives.
            Claimed => matches!(next, Running | Stopping | Failed | Stopped),
            Running => matches!(next, Stopping | Completed | Failed | Stopped),
            Stopping => matches!(next, Completed | Failed | Stopped),
            Completed | Failed | Stopped => false,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::PendingNoMatch => write!(f, "pending_no_match"),
            RunStatus::Claimed => write!(f, "claimed"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Stopping => write!(f, "stopping"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Stopped => write!(f, "stopped"),
        }
    }
}

impl From<RunOutcome> for RunStatus {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed => RunStatus::Completed,
            RunOutcome::Failed => RunStatus::Failed,
            RunOutcome::Stopped => RunStatus::Stopped,
        }
    }
}

/// One activation of a session. Lives in the run queue until terminal; never
/// persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Run {
    pub run_id: String,
    pub session_id: String,
    #[serde(rename = "type")]
    pub run_type: RunType,
    pub status: RunStatus,
    pub demands: Demands,
    pub payload: RunPayload,
    pub runner_id: Option<String>,
    pub created_at: String,
    pub claimed_at: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub error: Option<String>,
    /// No-match expiry deadline; meaningful only while pending.
    #[serde(skip)]
    pub expires_at: Instant,
    /// When the run reached a terminal status; drives queue pruning.
    #[serde(skip)]
    pub retired_at: Option<Instant>,
}

impl Run {
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_never_transition() {
        for terminal in [RunStatus::Completed, RunStatus::Failed, RunStatus::Stopped] {
            for next in [
                RunStatus::Pending,
                RunStatus::Claimed,
                RunStatus::Running,
                RunStatus::Completed,
            ] {
                assert!(!terminal.may_transition(next));
            }
        }
    }

    #[test]
    fn happy_path_is_legal() {
        assert!(RunStatus::Pending.may_transition(RunStatus::Claimed));
        assert!(RunStatus::Claimed.may_transition(RunStatus::Running));
        assert!(RunStatus::Running.may_transition(RunStatus::Completed));
    }

    #[test]
    fn stopping_interposes_on_the_active_path() {
        assert!(RunStatus::Running.may_transition(RunStatus::Stopping));
        assert!(RunStatus::Stopping.may_transition(RunStatus::Stopped));
        assert!(!RunStatus::Stopping.may_transition(RunStatus::Running));
    }

    #[test]
    fn pending_cannot_jump_to_running() {
        assert!(!RunStatus::Pending.may_transition(RunStatus::Running));
        assert!(!RunStatus::PendingNoMatch.may_transition(RunStatus::Running));
    }
}
