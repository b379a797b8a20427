//! Runner registry: identity, liveness, wake signals, stop delivery.

pub mod models;
pub mod registry;
pub mod sweeper;

pub use models::{Runner, RunnerStatus};
pub use registry::RunnerRegistry;
