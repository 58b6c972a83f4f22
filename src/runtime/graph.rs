//! In-memory node graph.
//!
//! Nodes are handlers keyed by id; connections leave a numbered output
//! port of one node and enter another. Connection order is registration
//! order and is the order fan-out happens in.

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::NodeError;

/// Loop output port for per-iteration nodes.
pub const ITERATION_PORT: usize = 0;

/// Loop output port for nodes that run once the loop finishes.
pub const COMPLETE_PORT: usize = 1;

/// A node that turns an input value into an output value.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn execute(&self, node_id: &str, input: Value) -> Result<Value, NodeError>;
}

/// Adapter for synchronous closures.
pub struct FnNode<F>(F);

impl<F> FnNode<F>
where
    F: Fn(Value) -> Result<Value, NodeError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> NodeHandler for FnNode<F>
where
    F: Fn(Value) -> Result<Value, NodeError> + Send + Sync,
{
    async fn execute(&self, _node_id: &str, input: Value) -> Result<Value, NodeError> {
        (self.0)(input)
    }
}

/// Directed edge from `source`'s output port to `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub source: String,
    pub source_port: usize,
    pub target: String,
}

#[derive(Default)]
pub struct FlowGraph {
    nodes: HashMap<String, Arc<dyn NodeHandler>>,
    connections: Vec<Connection>,
}

impl std::fmt::Debug for FlowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.nodes.keys().collect();
        ids.sort();
        f.debug_struct("FlowGraph")
            .field("nodes", &ids)
            .field("connections", &self.connections)
            .finish()
    }
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node, replacing any node with the same id.
    pub fn add_node<H: NodeHandler + 'static>(&mut self, id: &str, handler: H) -> &mut Self {
        self.nodes.insert(id.to_string(), Arc::new(handler));
        self
    }

    /// Wire `source`'s `port` to `target`.
    pub fn connect(&mut self, source: &str, port: usize, target: &str) -> &mut Self {
        self.connections.push(Connection {
            source: source.to_string(),
            source_port: port,
            target: target.to_string(),
        });
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Targets wired to `source`'s `port`, in registration order.
    pub fn targets(&self, source: &str, port: usize) -> Vec<&str> {
        self.connections
            .iter()
            .filter(|c| c.source == source && c.source_port == port)
            .map(|c| c.target.as_str())
            .collect()
    }

    /// Run `node_id` and everything downstream of it, depth first.
    ///
    /// Returns the node's own output. Nodes already in `visited` are
    /// skipped, which also stops cycles.
    pub fn execute_node<'a>(
        &'a self,
        node_id: &'a str,
        input: Value,
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, Result<Value, NodeError>> {
        async move {
            let handler = self
                .nodes
                .get(node_id)
                .cloned()
                .ok_or_else(|| NodeError::NodeNotFound(node_id.to_string()))?;
            visited.insert(node_id.to_string());

            let output = handler.execute(node_id, input).await?;

            for connection in self.connections.iter().filter(|c| c.source == node_id) {
                if visited.contains(&connection.target) {
                    log::debug!("Skipping already visited node {}", connection.target);
                    continue;
                }
                self.execute_node(&connection.target, output.clone(), visited).await?;
            }
            Ok(output)
        }
        .boxed()
    }
}
