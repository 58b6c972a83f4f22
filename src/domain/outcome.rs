//! Loop execution outcome types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why a strategy stopped iterating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// All requested iterations ran
    Completed,
    /// The owning flow was deactivated
    Cancelled,
    /// The max-iterations cap ended the loop
    LimitReached,
    /// A While condition evaluated false
    ConditionFalse,
}

/// Result of a successful loop execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopReport {
    /// Value returned by the loop node and sent to the Complete branch
    pub output: Value,
    /// Iterations actually performed
    pub iterations: usize,
    pub stop_reason: StopReason,
}
