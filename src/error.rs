//! Error types for flowloop
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

use crate::config::LoopType;
use crate::runtime::NodeError;

/// All error kinds a loop execution can raise
#[derive(Debug, Error)]
pub enum LoopError {
    /// ForEach path resolved to something other than an array
    #[error("Failed to access array at path '{path}': Path '{path}' does not point to an array")]
    InvalidArrayPath { path: String },

    /// ForEach with no path and non-array input
    #[error("Input is not an array and no valid array path provided")]
    InputNotArray,

    /// While loop without a condition
    #[error("No condition provided for while loop")]
    MissingCondition,

    /// Condition failed to parse or raised while evaluating
    #[error("Error evaluating condition: {0}")]
    ConditionEvaluation(String),

    /// Condition stayed true with unchanged inputs for a whole history window
    #[error(
        "Potential infinite loop detected: condition remains true with same values for {repeats} consecutive iterations"
    )]
    PotentialInfiniteLoop { repeats: usize },

    /// A node on the Iteration branch failed
    #[error("Error in loop iteration: {0}")]
    Downstream(#[from] NodeError),

    /// Loop settings could not be normalized
    #[error("Invalid loop settings: {0}")]
    InvalidSettings(String),

    /// Fatal error raised inside a strategy, tagged with the strategy
    #[error("{loop_type} loop execution failed: {source}")]
    ExecutionFailed {
        loop_type: LoopType,
        #[source]
        source: Box<LoopError>,
    },
}

impl LoopError {
    /// Wrap a strategy error for the caller
    pub fn execution_failed(loop_type: LoopType, source: LoopError) -> Self {
        LoopError::ExecutionFailed {
            loop_type,
            source: Box::new(source),
        }
    }

    /// The innermost error kind, unwrapping `ExecutionFailed`
    pub fn root_cause(&self) -> &LoopError {
        match self {
            LoopError::ExecutionFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type alias for flowloop operations
pub type Result<T> = std::result::Result<T, LoopError>;
