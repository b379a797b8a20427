//! Canonical protocol types for cordo.
//!
//! Everything a runner daemon and the coordinator exchange over HTTP is
//! defined here: demand/profile matching inputs, the long-poll envelope,
//! resolved run payloads, and session event bodies. The coordinator binary
//! depends on this crate; external runner implementations can too.

pub mod demands;
pub mod events;
pub mod payload;
pub mod runner;

pub use demands::{Demands, RunnerProfile};
pub use events::AppendEventRequest;
pub use payload::{
    BlueprintKind, ParameterStrategy, ResolvedBlueprint, RunPayload, RunType, RuntimeContext,
};
pub use runner::{
    CompleteRunRequest, HeartbeatResponse, PollMessage, RegisterRequest, RegisterResponse,
    RunOutcome, StopCommand,
};
