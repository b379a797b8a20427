//! Typed bidirectional relations between sessions.

pub mod models;
pub mod repository;

pub use models::{Relation, RelationDefinition};
pub use repository::RelationRepository;
