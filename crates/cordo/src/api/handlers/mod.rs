//! API handlers, grouped by resource.

pub mod misc;
pub mod relations;
pub mod runners;
pub mod runs;
pub mod sessions;

pub use misc::*;
pub use relations::*;
pub use runners::*;
pub use runs::*;
pub use sessions::*;
