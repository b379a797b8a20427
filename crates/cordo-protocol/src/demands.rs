//! Runner demands and the satisfaction predicate.
//!
//! A run carries [`Demands`]; a runner presents a [`RunnerProfile`]. The same
//! predicate decides (a) which pending run a polling runner may claim and
//! (b) which runner wake signals to fire when a run is enqueued or a runner
//! registers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Hard requirements a runner must satisfy to be allowed to claim a run.
///
/// Identity fields are exact-match when present; an unspecified field matches
/// any runner. Tags are satisfied when the runner's tag set is a superset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demands {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_dir: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_type: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

/// A runner's identity tuple and capability tags as seen by demand matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerProfile {
    pub hostname: String,
    pub project_dir: String,
    pub executor_type: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Demands {
    /// True when no field constrains anything.
    pub fn is_unconstrained(&self) -> bool {
        self.hostname.is_none()
            && self.project_dir.is_none()
            && self.executor_type.is_none()
            && self.tags.is_empty()
    }

    /// Does `profile` satisfy these demands?
    pub fn satisfied_by(&self, profile: &RunnerProfile) -> bool {
        if let Some(host) = &self.hostname {
            if host != &profile.hostname {
                return false;
            }
        }
        if let Some(dir) = &self.project_dir {
            if dir != &profile.project_dir {
                return false;
            }
        }
        if let Some(exec) = &self.executor_type {
            if exec != &profile.executor_type {
                return false;
            }
        }
        self.tags.is_subset(&profile.tags)
    }

    /// Merge request-supplied demands into blueprint-declared ones.
    ///
    /// Additive only: a blueprint value that is set survives regardless of the
    /// request; the request can fill unset fields and add tags.
    pub fn merge_additive(blueprint: &Demands, additional: &Demands) -> Demands {
        Demands {
            hostname: blueprint
                .hostname
                .clone()
                .or_else(|| additional.hostname.clone()),
            project_dir: blueprint
                .project_dir
                .clone()
                .or_else(|| additional.project_dir.clone()),
            executor_type: blueprint
                .executor_type
                .clone()
                .or_else(|| additional.executor_type.clone()),
            tags: blueprint.tags.union(&additional.tags).cloned().collect(),
        }
    }

    /// Pin these demands to an exact affinity tuple (used for resume runs).
    pub fn with_affinity(mut self, hostname: &str, project_dir: &str, executor_type: &str) -> Self {
        self.hostname = Some(hostname.to_string());
        self.project_dir = Some(project_dir.to_string());
        self.executor_type = Some(executor_type.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(tags: &[&str]) -> RunnerProfile {
        RunnerProfile {
            hostname: "alpha".into(),
            project_dir: "/work".into(),
            executor_type: "claude-code".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn tag_set(tags: &[&str]) -> BTreeSet<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn empty_demands_match_any_runner() {
        assert!(Demands::default().satisfied_by(&profile(&[])));
        assert!(Demands::default().satisfied_by(&profile(&["gpu"])));
    }

    #[test]
    fn identity_fields_are_exact_match() {
        let demands = Demands {
            hostname: Some("alpha".into()),
            ..Default::default()
        };
        assert!(demands.satisfied_by(&profile(&[])));

        let demands = Demands {
            hostname: Some("beta".into()),
            ..Default::default()
        };
        assert!(!demands.satisfied_by(&profile(&[])));
    }

    #[test]
    fn tags_require_superset() {
        let demands = Demands {
            tags: tag_set(&["gpu", "python"]),
            ..Default::default()
        };
        assert!(!demands.satisfied_by(&profile(&["gpu"])));
        assert!(demands.satisfied_by(&profile(&["gpu", "python"])));
        assert!(demands.satisfied_by(&profile(&["gpu", "python", "extra"])));
    }

    #[test]
    fn merge_keeps_blueprint_values() {
        let blueprint = Demands {
            hostname: Some("alpha".into()),
            tags: tag_set(&["gpu"]),
            ..Default::default()
        };
        let additional = Demands {
            hostname: Some("beta".into()),
            project_dir: Some("/work".into()),
            tags: tag_set(&["python"]),
            ..Default::default()
        };

        let merged = Demands::merge_additive(&blueprint, &additional);
        assert_eq!(merged.hostname.as_deref(), Some("alpha"));
        assert_eq!(merged.project_dir.as_deref(), Some("/work"));
        assert_eq!(merged.tags, tag_set(&["gpu", "python"]));
    }

    #[test]
    fn affinity_pins_all_identity_fields() {
        let demands = Demands {
            tags: tag_set(&["gpu"]),
            ..Default::default()
        }
        .with_affinity("alpha", "/work", "claude-code");

        assert!(demands.satisfied_by(&profile(&["gpu"])));

        let elsewhere = RunnerProfile {
            hostname: "beta".into(),
            ..profile(&["gpu"])
        };
        assert!(!demands.satisfied_by(&elsewhere));
    }
}
