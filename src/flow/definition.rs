//! Flow files.
//!
//! A flow file describes one loop node together with the nodes wired to
//! its Iteration and Complete ports:
//!
//! ```yaml
//! input: { data: { items: [1, 2, 3] } }
//! loop: { loopType: forEach, arrayPath: data.items, collectResults: true }
//! iteration:
//!   - { id: value, kind: pick, path: item }
//! complete:
//!   - { id: done, kind: echo }
//! ```
//!
//! A node with `after: <id>` is wired to that node's output instead of the
//! loop port, which allows short chains.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use super::nodes::NodeKind;
use crate::config::{GlobalConfig, LoopConfig};
use crate::runtime::{COMPLETE_PORT, FlowGraph, ITERATION_PORT};

/// Node id of the loop itself inside a built graph.
pub const LOOP_NODE_ID: &str = "loop";

/// One node entry in a flow file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,

    /// Upstream node id; defaults to the loop port of the enclosing list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,

    #[serde(flatten)]
    pub kind: NodeKind,
}

/// Parsed flow file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowDefinition {
    /// Value fed into the loop node.
    pub input: Value,

    /// Raw loop node settings, camelCase as the editor stores them.
    #[serde(rename = "loop")]
    pub settings: Value,

    /// Nodes run once per iteration.
    pub iteration: Vec<NodeSpec>,

    /// Nodes run once the loop finishes.
    pub complete: Vec<NodeSpec>,
}

impl FlowDefinition {
    /// Load a flow definition from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.as_ref().display()))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", path.as_ref().display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let def: Self = serde_yaml::from_str(content)?;
        Ok(def)
    }

    /// Normalized loop settings, with unset keys taken from `global`.
    pub fn loop_config(&self, global: &GlobalConfig) -> Result<LoopConfig> {
        let settings = global.settings_with_defaults(&self.settings);
        Ok(LoopConfig::from_settings(&settings)?)
    }

    /// Wire the declared nodes into a graph around `LOOP_NODE_ID`.
    pub fn build_graph(&self) -> Result<FlowGraph> {
        self.validate()?;
        let mut graph = FlowGraph::new();
        for (port, nodes) in [(ITERATION_PORT, &self.iteration), (COMPLETE_PORT, &self.complete)] {
            for node in nodes {
                graph.add_node(&node.id, node.kind.clone());
                match &node.after {
                    Some(upstream) => graph.connect(upstream, 0, &node.id),
                    None => graph.connect(LOOP_NODE_ID, port, &node.id),
                };
            }
        }
        Ok(graph)
    }

    /// Structural checks: unique ids and resolvable `after` references.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for node in self.iteration.iter().chain(&self.complete) {
            if node.id.is_empty() {
                eyre::bail!("Node id cannot be empty");
            }
            if node.id == LOOP_NODE_ID {
                eyre::bail!("Node id '{}' is reserved", LOOP_NODE_ID);
            }
            if !seen.insert(node.id.as_str()) {
                eyre::bail!("Duplicate node id '{}'", node.id);
            }
        }
        for node in self.iteration.iter().chain(&self.complete) {
            if let Some(upstream) = &node.after
                && !seen.contains(upstream.as_str())
            {
                eyre::bail!("Node '{}' runs after unknown node '{}'", node.id, upstream);
            }
        }
        Ok(())
    }
}
