//! Engine — the per-instrument state machine and its surroundings.
//!
//! - [`event_loop`]: [`Engine`], reacting to bars, quotes, fills and rejects
//! - [`state`]: mutable engine state and the pending-action record
//! - [`gateway`]: the order gateway seam and a paper implementation
//! - [`replay`]: bar-by-bar historical replay through a paper gateway

pub mod event_loop;
pub mod gateway;
pub mod replay;
pub mod state;

pub use event_loop::Engine;
pub use gateway::{OrderGateway, PaperAccount, PaperGateway};
pub use replay::{run_replay, ReplaySummary};
pub use state::{EngineState, EngineStats, Pending};
