//! Blueprints: declarative agent and deterministic-task definitions loaded
//! from disk, plus the machinery that turns a request into a self-contained
//! run payload (schema validation, demand merging, placeholder resolution).

pub mod loader;
pub mod models;
pub mod placeholder;
pub mod schema;

pub use loader::BlueprintStore;
pub use models::Blueprint;
pub use placeholder::PlaceholderContext;
