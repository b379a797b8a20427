//! Relation data models.

use serde::{Deserialize, Serialize};

/// Closed set of relation definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationDefinition {
    /// Deleting one endpoint cascades to the other.
    ParentChild,
    Related,
    PredecessorSuccessor,
}

impl RelationDefinition {
    pub fn all() -> [RelationDefinition; 3] {
        [
            RelationDefinition::ParentChild,
            RelationDefinition::Related,
            RelationDefinition::PredecessorSuccessor,
        ]
    }

    /// Whether deleting one endpoint deletes the peer document too.
    pub fn cascading_delete(self) -> bool {
        matches!(self, RelationDefinition::ParentChild)
    }
}

impl std::fmt::Display for RelationDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelationDefinition::ParentChild => write!(f, "parent-child"),
            RelationDefinition::Related => write!(f, "related"),
            RelationDefinition::PredecessorSuccessor => write!(f, "predecessor-successor"),
        }
    }
}

impl std::str::FromStr for RelationDefinition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parent-child" => Ok(RelationDefinition::ParentChild),
            "related" => Ok(RelationDefinition::Related),
            "predecessor-successor" => Ok(RelationDefinition::PredecessorSuccessor),
            _ => Err(format!("unknown relation definition: {}", s)),
        }
    }
}

impl TryFrom<String> for RelationDefinition {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        value.parse()
    }
}

/// One stored half of a logical relation. The mirror row shares `pair_id`
/// with endpoints swapped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub id: String,
    pub pair_id: String,
    pub definition: RelationDefinition,
    pub document_id: String,
    pub peer_document_id: String,
    pub note: Option<String>,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definitions_round_trip() {
        for def in RelationDefinition::all() {
            let parsed: RelationDefinition = def.to_string().parse().unwrap();
            assert_eq!(parsed, def);
        }
    }

    #[test]
    fn only_parent_child_cascades() {
        assert!(RelationDefinition::ParentChild.cascading_delete());
        assert!(!RelationDefinition::Related.cascading_delete());
        assert!(!RelationDefinition::PredecessorSuccessor.cascading_delete());
    }
}
