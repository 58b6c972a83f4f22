//! Flow runtime collaborator
//!
//! The loop engine never touches the node graph directly. It talks to a
//! `Runtime`, which knows which nodes hang off the loop's Iteration and
//! Complete ports, whether the owning flow is still active, and where log
//! events go.
//!
//! - `Runtime`: the trait the engine drives
//! - `FlowGraph`/`FlowRuntime`: in-memory node graph implementation
//! - `MockRuntime`: scriptable runtime for tests

pub mod flow;
pub mod graph;
pub mod mock;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

use crate::domain::LogLevel;

pub use flow::FlowRuntime;
pub use graph::{COMPLETE_PORT, Connection, FlowGraph, FnNode, ITERATION_PORT, NodeHandler};
pub use mock::MockRuntime;

/// Errors raised by nodes or the runtime.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NodeError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Node {node} failed: {message}")]
    Execution { node: String, message: String },
}

impl NodeError {
    pub fn execution(node: &str, message: impl Into<String>) -> Self {
        NodeError::Execution {
            node: node.to_string(),
            message: message.into(),
        }
    }
}

/// Iteration progress reported after each pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationProgress {
    pub completed: usize,
    /// Known up front for Count and ForEach loops only
    pub total: Option<usize>,
}

impl IterationProgress {
    /// Completion percentage, capped at 100.
    pub fn percent(&self) -> Option<f64> {
        self.total
            .filter(|t| *t > 0)
            .map(|t| (self.completed as f64 / t as f64 * 100.0).min(100.0))
    }
}

/// What the loop engine needs from the surrounding flow.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Run every node wired to the Iteration port, in registration order,
    /// returning their outputs. The first failure aborts the pass.
    async fn run_iteration_branch(&self, context: Value) -> Result<Vec<Value>, NodeError>;

    /// Run every node wired to the Complete port with the final output.
    async fn run_completion_branch(&self, output: &Value) -> Result<(), NodeError>;

    /// Whether the owning flow is still running.
    fn is_active(&self) -> bool;

    /// Event sink; every level is always recorded.
    fn log(&self, level: LogLevel, message: &str);

    /// Progress hook, called after each completed iteration.
    fn on_progress(&self, _progress: IterationProgress) {}
}

/// Shared "flow is active" flag used for cooperative cancellation.
#[derive(Debug, Clone)]
pub struct ActivationFlag(Arc<AtomicBool>);

impl Default for ActivationFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivationFlag {
    /// A new, active flag.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn deactivate(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn activate(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}
