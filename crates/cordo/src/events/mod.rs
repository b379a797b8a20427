//! In-process event fan-out for the SSE front-end.

pub mod hub;

pub use hub::{EventHub, FrameKind, StreamFrame};
