//! `Runtime` implementation backed by a `FlowGraph`.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::graph::{COMPLETE_PORT, FlowGraph, ITERATION_PORT};
use super::{ActivationFlag, IterationProgress, NodeError, Runtime};
use crate::config::LoopType;
use crate::domain::{LogEvent, LogLevel, format_log_message};

/// Runs the branches of one loop node inside a graph.
pub struct FlowRuntime {
    graph: Arc<FlowGraph>,
    loop_node: String,
    loop_type: LoopType,
    activation: ActivationFlag,
    events: Mutex<Vec<LogEvent>>,
    progress: Mutex<Option<IterationProgress>>,
}

impl FlowRuntime {
    pub fn new(graph: Arc<FlowGraph>, loop_node: &str, loop_type: LoopType, activation: ActivationFlag) -> Self {
        Self {
            graph,
            loop_node: loop_node.to_string(),
            loop_type,
            activation,
            events: Mutex::new(Vec::new()),
            progress: Mutex::new(None),
        }
    }

    /// Events recorded so far, oldest first.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Most recent progress report.
    pub fn last_progress(&self) -> Option<IterationProgress> {
        self.progress.lock().ok().and_then(|p| *p)
    }

    /// Each branch run starts from a fresh visited set containing the loop
    /// node, so chains that lead back into the loop stop there.
    fn visited(&self) -> HashSet<String> {
        HashSet::from([self.loop_node.clone()])
    }
}

#[async_trait]
impl Runtime for FlowRuntime {
    async fn run_iteration_branch(&self, context: Value) -> Result<Vec<Value>, NodeError> {
        let targets = self.graph.targets(&self.loop_node, ITERATION_PORT);
        let mut outputs = Vec::with_capacity(targets.len());
        for target in targets {
            let mut visited = self.visited();
            let output = self.graph.execute_node(target, context.clone(), &mut visited).await?;
            outputs.push(output);
        }
        Ok(outputs)
    }

    async fn run_completion_branch(&self, output: &Value) -> Result<(), NodeError> {
        let mut first_error = None;
        for target in self.graph.targets(&self.loop_node, COMPLETE_PORT) {
            let mut visited = self.visited();
            if let Err(e) = self.graph.execute_node(target, output.clone(), &mut visited).await {
                log::error!("Error in loop completion node {}: {}", target, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn is_active(&self) -> bool {
        self.activation.is_active()
    }

    fn log(&self, level: LogLevel, message: &str) {
        let display = format_log_message(self.loop_type, level, message);
        log::log!(level.to_log_level(), "[{}] {}", self.loop_node, display);
        if let Ok(mut events) = self.events.lock() {
            events.push(LogEvent::new(level, message).for_node(&self.loop_node));
        }
    }

    fn on_progress(&self, progress: IterationProgress) {
        if let Ok(mut last) = self.progress.lock() {
            *last = Some(progress);
        }
    }
}
