//! HTTP API layer.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod sse;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
