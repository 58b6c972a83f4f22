//! Loop engine module.
//!
//! - LoopEngine: strategy selection, caps, completion branch
//! - IterationExecutor: one pass of the Iteration branch with delay and heartbeat
//! - resolve_path: dotted lookups for ForEach array paths

mod executor;
mod loop_engine;
mod path;

pub use executor::{Heartbeat, IterationExecutor};
pub use loop_engine::LoopEngine;
pub use path::resolve_path;
