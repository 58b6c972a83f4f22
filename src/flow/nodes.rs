//! Built-in node kinds available in flow files.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::resolve_path;
use crate::runtime::{NodeError, NodeHandler};

/// A node declared in a flow file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeKind {
    /// Pass the input through unchanged
    Echo,
    /// Value at a dotted path into the input, `null` when absent
    Pick { path: String },
    /// A fixed value regardless of input
    Constant { value: Value },
    /// Always fail with `message`
    Fail { message: String },
}

#[async_trait]
impl NodeHandler for NodeKind {
    async fn execute(&self, node_id: &str, input: Value) -> Result<Value, NodeError> {
        log::debug!("node {} ({}) executing", node_id, self.name());
        match self {
            NodeKind::Echo => Ok(input),
            NodeKind::Pick { path } => Ok(resolve_path(&input, path).cloned().unwrap_or(Value::Null)),
            NodeKind::Constant { value } => Ok(value.clone()),
            NodeKind::Fail { message } => Err(NodeError::execution(node_id, message.clone())),
        }
    }
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Echo => "echo",
            NodeKind::Pick { .. } => "pick",
            NodeKind::Constant { .. } => "constant",
            NodeKind::Fail { .. } => "fail",
        }
    }
}
