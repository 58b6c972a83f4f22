//! Flow files and the built-in nodes they can use.

mod definition;
mod nodes;

use eyre::Result;
use std::sync::Arc;

pub use definition::{FlowDefinition, LOOP_NODE_ID, NodeSpec};
pub use nodes::NodeKind;

use crate::config::GlobalConfig;
use crate::domain::{LogEvent, LoopReport};
use crate::engine::LoopEngine;
use crate::runtime::{ActivationFlag, FlowRuntime};

/// Outcome of running a flow file.
#[derive(Debug)]
pub struct FlowRun {
    /// What the loop node returned, or why it failed
    pub result: crate::Result<LoopReport>,
    /// Events the loop logged, oldest first
    pub events: Vec<LogEvent>,
}

/// Build the flow's graph and run its loop node to completion.
///
/// Setup problems (bad wiring, bad settings) are returned as errors; a
/// loop that fails while running is reported through `FlowRun::result`.
pub async fn run_flow(definition: &FlowDefinition, global: &GlobalConfig, activation: ActivationFlag) -> Result<FlowRun> {
    let config = definition.loop_config(global)?;
    let graph = Arc::new(definition.build_graph()?);
    let runtime = FlowRuntime::new(graph, LOOP_NODE_ID, config.loop_type, activation);
    let engine = LoopEngine::new(global.engine.clone());

    log::info!("Running {} loop flow", config.loop_type);
    let result = engine
        .execute_detailed(&config, definition.input.clone(), &runtime)
        .await;
    Ok(FlowRun {
        result,
        events: runtime.events(),
    })
}
