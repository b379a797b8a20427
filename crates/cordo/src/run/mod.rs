//! Runs: ephemeral, in-memory units of work.

pub mod models;
pub mod queue;
pub mod service;
pub mod sweeper;

pub use models::{Run, RunStatus};
pub use queue::RunQueue;
pub use service::{CreateRunRequest, CreateRunResponse, RunService};
