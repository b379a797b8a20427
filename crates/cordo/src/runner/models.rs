//! Runner data models.
//!
//! Runner records live in memory only; a coordinator restart simply requires
//! runners to re-register, which their poll loops do anyway.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use cordo_protocol::RunnerProfile;

/// Runner liveness. Removal is record deletion, not a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerStatus {
    Online,
    Stale,
}

impl std::fmt::Display for RunnerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunnerStatus::Online => write!(f, "online"),
            RunnerStatus::Stale => write!(f, "stale"),
        }
    }
}

/// A registered external worker.
#[derive(Debug, Clone)]
pub struct Runner {
    /// Derived from the identity tuple (`lnch_<hex>`).
    pub runner_id: String,
    pub hostname: String,
    pub project_dir: String,
    pub executor_type: String,
    pub tags: BTreeSet<String>,
    pub status: RunnerStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
}

impl Runner {
    pub fn profile(&self) -> RunnerProfile {
        RunnerProfile {
            hostname: self.hostname.clone(),
            project_dir: self.project_dir.clone(),
            executor_type: self.executor_type.clone(),
            tags: self.tags.clone(),
        }
    }
}
