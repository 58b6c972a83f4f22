//! Single iteration pass: downstream run, delay and heartbeat.

use std::time::Duration;
use tokio::time::Instant;

use crate::config::{EngineConfig, LoopConfig};
use crate::domain::{LogLevel, LoopContext};
use crate::error::Result;
use crate::runtime::{IterationProgress, Runtime};

/// Tracks wall time of a loop for "still running" reports.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    start: Instant,
    last: Instant,
    interval: Duration,
    slow_after: Duration,
}

impl Heartbeat {
    pub fn new(interval: Duration, slow_after: Duration) -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            interval,
            slow_after,
        }
    }

    /// Messages due after `completed` iterations, if any.
    ///
    /// A heartbeat fires once more than `interval` has passed since the
    /// previous one. Once the loop has run longer than `slow_after`, every
    /// heartbeat also carries a warning.
    pub fn beat(&mut self, completed: usize) -> Vec<(LogLevel, String)> {
        let now = Instant::now();
        if now.duration_since(self.last) <= self.interval {
            return Vec::new();
        }
        self.last = now;

        let mut messages = vec![(
            LogLevel::Info,
            format!("Loop still running: {} iterations completed", completed),
        )];
        let elapsed = now.duration_since(self.start);
        if elapsed > self.slow_after {
            messages.push((
                LogLevel::Warning,
                format!(
                    "Loop has been running for {} seconds. Consider adding a delay or reducing iterations.",
                    elapsed.as_secs()
                ),
            ));
        }
        messages
    }
}

/// Runs the Iteration branch once per call on behalf of a strategy.
pub struct IterationExecutor<'a, R: Runtime + ?Sized> {
    runtime: &'a R,
    config: &'a LoopConfig,
    heartbeat: Heartbeat,
    total: Option<usize>,
}

impl<'a, R: Runtime + ?Sized> IterationExecutor<'a, R> {
    /// `total` is the planned iteration count when it is known up front.
    pub fn new(runtime: &'a R, config: &'a LoopConfig, engine: &EngineConfig, total: Option<usize>) -> Self {
        Self {
            runtime,
            config,
            heartbeat: Heartbeat::new(engine.heartbeat_interval(), engine.slow_loop_warning()),
            total,
        }
    }

    /// Run one pass for the iteration at `context.index`.
    ///
    /// Downstream failures are returned immediately; the delay and the
    /// heartbeat are skipped in that case.
    pub async fn run(&mut self, context: &mut LoopContext) -> Result<()> {
        let outputs = self.runtime.run_iteration_branch(context.snapshot()).await?;
        if self.config.collect_results {
            context.results.extend(outputs);
        }

        if self.config.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.delay_ms)).await;
        }

        let completed = context.index + 1;
        for (level, message) in self.heartbeat.beat(completed) {
            self.runtime.log(level, &message);
        }
        self.runtime.on_progress(IterationProgress {
            completed,
            total: self.total,
        });
        Ok(())
    }
}
