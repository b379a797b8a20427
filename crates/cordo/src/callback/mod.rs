//! Callback processor: feeds completed child sessions back into their
//! parents as resume runs.

pub mod format;
pub mod processor;

pub use processor::{CallbackProcessor, ChildResult, CompletionNotice};
