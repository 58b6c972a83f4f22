//! Scriptable runtime for tests.
//!
//! Every call is recorded so assertions can inspect what the engine sent
//! downstream, what it logged and when it stopped.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{ActivationFlag, IterationProgress, NodeError, Runtime};
use crate::domain::{LogEvent, LogLevel};

type Responder = Box<dyn Fn(&Value) -> Result<Vec<Value>, NodeError> + Send + Sync>;

pub struct MockRuntime {
    responder: Responder,
    fail_on_call: Option<usize>,
    deactivate_after: Option<usize>,
    completion_error: Option<NodeError>,
    activation: ActivationFlag,
    calls: AtomicUsize,
    contexts: Mutex<Vec<Value>>,
    completions: Mutex<Vec<Value>>,
    logs: Mutex<Vec<LogEvent>>,
    progress: Mutex<Vec<IterationProgress>>,
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRuntime {
    /// A runtime whose Iteration branch has no nodes.
    pub fn new() -> Self {
        Self {
            responder: Box::new(|_| Ok(Vec::new())),
            fail_on_call: None,
            deactivate_after: None,
            completion_error: None,
            activation: ActivationFlag::new(),
            calls: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
            completions: Mutex::new(Vec::new()),
            logs: Mutex::new(Vec::new()),
            progress: Mutex::new(Vec::new()),
        }
    }

    /// Compute the Iteration branch outputs from the context snapshot.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&Value) -> Result<Vec<Value>, NodeError> + Send + Sync + 'static,
    {
        self.responder = Box::new(responder);
        self
    }

    /// Return the same outputs on every iteration.
    pub fn with_outputs(self, outputs: Vec<Value>) -> Self {
        self.with_responder(move |_| Ok(outputs.clone()))
    }

    /// Fail the `call`th Iteration branch run (1-based).
    pub fn failing_on(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    /// Clear the activation flag once `calls` iterations have run.
    pub fn deactivating_after(mut self, calls: usize) -> Self {
        self.deactivate_after = Some(calls);
        self
    }

    pub fn failing_completion(mut self, error: NodeError) -> Self {
        self.completion_error = Some(error);
        self
    }

    pub fn activation(&self) -> &ActivationFlag {
        &self.activation
    }

    /// Number of Iteration branch runs so far.
    pub fn iteration_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Context snapshots received, in order.
    pub fn contexts(&self) -> Vec<Value> {
        self.contexts.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Outputs the Complete branch received.
    pub fn completions(&self) -> Vec<Value> {
        self.completions.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn logs(&self) -> Vec<LogEvent> {
        self.logs.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Messages logged at `level`.
    pub fn logs_at(&self, level: LogLevel) -> Vec<String> {
        self.logs()
            .into_iter()
            .filter(|e| e.level == level)
            .map(|e| e.message)
            .collect()
    }

    pub fn has_log(&self, level: LogLevel, needle: &str) -> bool {
        self.logs_at(level).iter().any(|m| m.contains(needle))
    }

    pub fn progress(&self) -> Vec<IterationProgress> {
        self.progress.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Runtime for MockRuntime {
    async fn run_iteration_branch(&self, context: Value) -> Result<Vec<Value>, NodeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut contexts) = self.contexts.lock() {
            contexts.push(context.clone());
        }

        if self.fail_on_call == Some(call) {
            return Err(NodeError::execution("mock", format!("iteration {} failed", call)));
        }
        let outputs = (self.responder)(&context)?;

        if self.deactivate_after.is_some_and(|n| call >= n) {
            self.activation.deactivate();
        }
        Ok(outputs)
    }

    async fn run_completion_branch(&self, output: &Value) -> Result<(), NodeError> {
        if let Ok(mut completions) = self.completions.lock() {
            completions.push(output.clone());
        }
        match &self.completion_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn is_active(&self) -> bool {
        self.activation.is_active()
    }

    fn log(&self, level: LogLevel, message: &str) {
        if let Ok(mut logs) = self.logs.lock() {
            logs.push(LogEvent::new(level, message));
        }
    }

    fn on_progress(&self, progress: IterationProgress) {
        if let Ok(mut all) = self.progress.lock() {
            all.push(progress);
        }
    }
}
