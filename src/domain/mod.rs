//! Domain types for flowloop
//!
//! - LoopContext: mutable state of one loop execution
//! - ConditionHistory: snapshot window for infinite-loop detection
//! - LoopReport/StopReason: what an execution produced and why it stopped
//! - LogEvent: events emitted while a loop runs

pub mod context;
pub mod event;
pub mod history;
pub mod outcome;

pub use context::LoopContext;
pub use event::{LogEvent, LogLevel, format_log_message};
pub use history::{ConditionHistory, DEFAULT_HISTORY_CAPACITY};
pub use outcome::{LoopReport, StopReason};
