//! Sessions: durable records of conversations and task executions.

pub mod models;
pub mod repository;
pub mod service;

pub use models::{ExecutionMode, NewSession, Session, SessionEvent, SessionFilter, SessionStatus};
pub use repository::{BindOutcome, SessionRepository};
pub use service::SessionService;
