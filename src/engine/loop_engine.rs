//! Loop node execution.
//!
//! `LoopEngine` runs one of three strategies against a `Runtime`:
//! - Count: a fixed number of passes
//! - ForEach: one pass per element of an array
//! - While: passes until a condition turns false
//!
//! Every strategy is capped by `maxIterations` and polls the runtime's
//! activation flag before each pass.

use serde_json::{Map, Value, json};
use std::collections::BTreeSet;

use super::executor::IterationExecutor;
use super::path::resolve_path;
use crate::config::{EngineConfig, LoopConfig, LoopType};
use crate::domain::{ConditionHistory, LogLevel, LoopContext, LoopReport, StopReason};
use crate::error::{LoopError, Result};
use crate::expr::{Bindings, Expression, ExpressionEvaluator};
use crate::runtime::Runtime;

/// Iterations performed and why the strategy stopped.
type StrategyOutcome = (usize, StopReason);

/// Executes loop nodes.
#[derive(Debug, Clone, Default)]
pub struct LoopEngine {
    settings: EngineConfig,
    evaluator: ExpressionEvaluator,
}

impl LoopEngine {
    pub fn new(settings: EngineConfig) -> Self {
        Self {
            settings,
            evaluator: ExpressionEvaluator::new(),
        }
    }

    /// Run the loop and return its output value.
    pub async fn execute<R: Runtime + ?Sized>(&self, config: &LoopConfig, input: Value, runtime: &R) -> Result<Value> {
        self.execute_detailed(config, input, runtime)
            .await
            .map(|report| report.output)
    }

    /// Run the loop and report how it ended.
    ///
    /// On success, including a cancelled run, the Complete branch receives
    /// the output before this returns. Failures there are logged and
    /// otherwise ignored. Strategy errors skip the Complete branch and come
    /// back as `LoopError::ExecutionFailed`.
    pub async fn execute_detailed<R: Runtime + ?Sized>(
        &self,
        config: &LoopConfig,
        input: Value,
        runtime: &R,
    ) -> Result<LoopReport> {
        log::debug!("execute_detailed: loop_type={} max_iterations={}", config.loop_type, config.max_iterations);
        let mut context = LoopContext::new(input, config);

        let outcome = match config.loop_type {
            LoopType::Count => self.run_count(config, &mut context, runtime).await,
            LoopType::ForEach => self.run_for_each(config, &mut context, runtime).await,
            LoopType::While => self.run_while(config, &mut context, runtime).await,
        };

        let (iterations, stop_reason) = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                runtime.log(LogLevel::Error, &format!("{} loop error: {}", config.loop_type, e));
                return Err(LoopError::execution_failed(config.loop_type, e));
            }
        };

        runtime.log(LogLevel::Success, &format!("Loop completed after {} iterations", iterations));

        let output = context.output(config.collect_results);
        if let Err(e) = runtime.run_completion_branch(&output).await {
            runtime.log(LogLevel::Error, &format!("Error in loop completion: {}", e));
        }

        log::debug!("execute_detailed: iterations={} stop_reason={:?}", iterations, stop_reason);
        Ok(LoopReport {
            output,
            iterations,
            stop_reason,
        })
    }

    async fn run_count<R: Runtime + ?Sized>(
        &self,
        config: &LoopConfig,
        context: &mut LoopContext,
        runtime: &R,
    ) -> Result<StrategyOutcome> {
        let limited = config.count > config.max_iterations;
        if limited {
            runtime.log(
                LogLevel::Warning,
                &format!(
                    "Limiting count loop to {} iterations (from {})",
                    config.max_iterations, config.count
                ),
            );
        }
        let total = to_usize(config.effective_count());
        runtime.log(LogLevel::Info, &format!("Executing count loop ({} iterations)", total));

        let mut executor = IterationExecutor::new(runtime, config, &self.settings, Some(total));
        for i in 0..total {
            if !runtime.is_active() {
                return Ok((i, stopped(runtime, i)));
            }
            context.index = i;
            executor.run(context).await?;
        }

        let reason = if limited {
            StopReason::LimitReached
        } else {
            StopReason::Completed
        };
        Ok((total, reason))
    }

    async fn run_for_each<R: Runtime + ?Sized>(
        &self,
        config: &LoopConfig,
        context: &mut LoopContext,
        runtime: &R,
    ) -> Result<StrategyOutcome> {
        let mut items = resolve_items(config, &context.input)?;

        let max = to_usize(config.max_iterations);
        let limited = items.len() > max;
        if limited {
            runtime.log(
                LogLevel::Warning,
                &format!("Array has {} items, limiting to {} iterations", items.len(), max),
            );
            items.truncate(max);
        }
        let total = items.len();
        runtime.log(LogLevel::Info, &format!("Executing forEach loop over {} items", total));

        let mut executor = IterationExecutor::new(runtime, config, &self.settings, Some(total));
        for (i, item) in items.into_iter().enumerate() {
            if !runtime.is_active() {
                return Ok((i, stopped(runtime, i)));
            }
            context.index = i;
            context.item = item;
            executor.run(context).await?;
        }

        let reason = if limited {
            StopReason::LimitReached
        } else {
            StopReason::Completed
        };
        Ok((total, reason))
    }

    async fn run_while<R: Runtime + ?Sized>(
        &self,
        config: &LoopConfig,
        context: &mut LoopContext,
        runtime: &R,
    ) -> Result<StrategyOutcome> {
        if config.condition.trim().is_empty() {
            return Err(LoopError::MissingCondition);
        }
        let condition = ExpressionEvaluator::compile(&config.condition)?;
        let watched = watched_variables(&condition, context);
        runtime.log(LogLevel::Info, &format!("Executing while loop: {}", condition.source()));

        let max = to_usize(config.max_iterations);
        let mut history = ConditionHistory::new(self.settings.condition_history);
        let mut executor = IterationExecutor::new(runtime, config, &self.settings, None);

        loop {
            let iterations = context.index;
            if !runtime.is_active() {
                return Ok((iterations, stopped(runtime, iterations)));
            }
            if iterations >= max {
                runtime.log(
                    LogLevel::Warning,
                    &format!("Loop reached maximum iterations limit ({})", config.max_iterations),
                );
                return Ok((iterations, StopReason::LimitReached));
            }

            let bindings = context.bindings();
            let result = self.evaluator.evaluate_compiled(&condition, &bindings)?;
            history.push(&condition_snapshot(result, &watched, &bindings));
            if result && history.is_stuck() && iterations > 2 * history.capacity() {
                return Err(LoopError::PotentialInfiniteLoop {
                    repeats: history.capacity(),
                });
            }
            if !result {
                return Ok((iterations, StopReason::ConditionFalse));
            }

            executor.run(context).await?;
            context.index += 1;
        }
    }
}

/// Array a ForEach loop walks: the value at `arrayPath`, or the input itself.
fn resolve_items(config: &LoopConfig, input: &Value) -> Result<Vec<Value>> {
    if config.array_path.is_empty() {
        return match input {
            Value::Array(items) => Ok(items.clone()),
            _ => Err(LoopError::InputNotArray),
        };
    }
    match resolve_path(input, &config.array_path) {
        Some(Value::Array(items)) => Ok(items.clone()),
        _ => Err(LoopError::InvalidArrayPath {
            path: config.array_path.clone(),
        }),
    }
}

/// Canonical names of the bindings a condition reads.
///
/// A custom index or item name reads the same value as `index`/`item`, so
/// both collapse to one entry.
fn watched_variables(condition: &Expression, context: &LoopContext) -> BTreeSet<String> {
    condition
        .variables()
        .iter()
        .map(|name| context.canonical_name(name).to_string())
        .collect()
}

/// What the infinite-loop detector compares between passes.
fn condition_snapshot(result: bool, watched: &BTreeSet<String>, bindings: &Bindings) -> Value {
    let vars: Map<String, Value> = watched
        .iter()
        .map(|name| (name.clone(), bindings.get(name).cloned().unwrap_or(Value::Null)))
        .collect();
    json!({ "result": result, "vars": vars })
}

fn stopped<R: Runtime + ?Sized>(runtime: &R, iterations: usize) -> StopReason {
    runtime.log(
        LogLevel::Info,
        &format!("Loop stopped after {} iterations - flow deactivated", iterations),
    );
    StopReason::Cancelled
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, NodeError};

    fn engine() -> LoopEngine {
        LoopEngine::default()
    }

    #[tokio::test]
    async fn test_count_runs_requested_iterations() {
        let runtime = MockRuntime::new();
        let report = engine()
            .execute_detailed(&LoopConfig::count(3), json!({"a": 1}), &runtime)
            .await
            .unwrap();

        assert_eq!(report.iterations, 3);
        assert_eq!(report.stop_reason, StopReason::Completed);
        assert_eq!(report.output, json!({"a": 1}));
        let indices: Vec<Value> = runtime.contexts().iter().map(|c| c["index"].clone()).collect();
        assert_eq!(indices, vec![json!(0), json!(1), json!(2)]);
        assert!(runtime.has_log(LogLevel::Success, "Loop completed after 3 iterations"));
    }

    #[tokio::test]
    async fn test_count_limited_by_max_iterations() {
        let runtime = MockRuntime::new();
        let config = LoopConfig::count(10).with_max_iterations(4);
        let report = engine().execute_detailed(&config, json!(null), &runtime).await.unwrap();

        assert_eq!(report.iterations, 4);
        assert_eq!(report.stop_reason, StopReason::LimitReached);
        assert_eq!(runtime.iteration_calls(), 4);
        assert!(runtime.has_log(LogLevel::Warning, "Limiting count loop to 4 iterations (from 10)"));
    }

    #[tokio::test]
    async fn test_custom_index_name_in_context() {
        let runtime = MockRuntime::new();
        let config = LoopConfig::count(2).with_names("i", "row");
        engine().execute(&config, json!(null), &runtime).await.unwrap();

        let contexts = runtime.contexts();
        assert_eq!(contexts[1]["i"], 1);
        assert_eq!(contexts[1]["index"], 1);
    }

    #[tokio::test]
    async fn test_for_each_over_input_array() {
        let runtime = MockRuntime::new().with_responder(|ctx| Ok(vec![ctx["item"].clone()]));
        let config = LoopConfig::for_each("").with_collect_results(true);
        let output = engine().execute(&config, json!(["a", "b"]), &runtime).await.unwrap();

        assert_eq!(output, json!({"value": ["a", "b"], "results": ["a", "b"]}));
    }

    #[tokio::test]
    async fn test_for_each_requires_array_input() {
        let runtime = MockRuntime::new();
        let err = engine()
            .execute(&LoopConfig::for_each(""), json!({"x": 1}), &runtime)
            .await
            .unwrap_err();

        assert!(matches!(err.root_cause(), LoopError::InputNotArray));
        assert!(runtime.completions().is_empty());
        assert!(runtime.has_log(LogLevel::Error, "forEach loop error: Input is not an array"));
    }

    #[tokio::test]
    async fn test_for_each_invalid_path() {
        let runtime = MockRuntime::new();
        let err = engine()
            .execute(&LoopConfig::for_each("data.items"), json!({"data": 5}), &runtime)
            .await
            .unwrap_err();

        assert!(matches!(err.root_cause(), LoopError::InvalidArrayPath { path } if path == "data.items"));
        assert!(err.to_string().starts_with("forEach loop execution failed: Failed to access array"));
    }

    #[tokio::test]
    async fn test_for_each_truncated() {
        let runtime = MockRuntime::new();
        let config = LoopConfig::for_each("items").with_max_iterations(2);
        let report = engine()
            .execute_detailed(&config, json!({"items": [1, 2, 3]}), &runtime)
            .await
            .unwrap();

        assert_eq!(report.iterations, 2);
        assert_eq!(report.stop_reason, StopReason::LimitReached);
        assert!(runtime.has_log(LogLevel::Warning, "Array has 3 items, limiting to 2 iterations"));
    }

    #[tokio::test]
    async fn test_while_stops_when_condition_false() {
        let runtime = MockRuntime::new();
        let report = engine()
            .execute_detailed(&LoopConfig::while_condition("index < 3"), json!(null), &runtime)
            .await
            .unwrap();

        assert_eq!(report.iterations, 3);
        assert_eq!(report.stop_reason, StopReason::ConditionFalse);
    }

    #[tokio::test]
    async fn test_while_reads_input_and_alias() {
        let runtime = MockRuntime::new();
        let config = LoopConfig::while_condition("n < input.limit").with_names("n", "row");
        let report = engine()
            .execute_detailed(&config, json!({"limit": 2}), &runtime)
            .await
            .unwrap();

        assert_eq!(report.iterations, 2);
    }

    #[tokio::test]
    async fn test_while_missing_condition() {
        let runtime = MockRuntime::new();
        let err = engine()
            .execute(&LoopConfig::while_condition(""), json!(null), &runtime)
            .await
            .unwrap_err();
        assert!(matches!(err.root_cause(), LoopError::MissingCondition));
    }

    #[tokio::test]
    async fn test_while_condition_error_is_fatal() {
        let runtime = MockRuntime::new();
        let err = engine()
            .execute(&LoopConfig::while_condition("missing > 1"), json!(null), &runtime)
            .await
            .unwrap_err();

        match err.root_cause() {
            LoopError::ConditionEvaluation(msg) => assert_eq!(msg, "missing is not defined"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(runtime.iteration_calls(), 0);
    }

    #[tokio::test]
    async fn test_while_max_iterations() {
        let runtime = MockRuntime::new();
        let config = LoopConfig::while_condition("index >= 0").with_max_iterations(7);
        let report = engine().execute_detailed(&config, json!(null), &runtime).await.unwrap();

        assert_eq!(report.iterations, 7);
        assert_eq!(report.stop_reason, StopReason::LimitReached);
        assert!(runtime.has_log(LogLevel::Warning, "Loop reached maximum iterations limit (7)"));
    }

    #[tokio::test]
    async fn test_while_constant_condition_detected() {
        let runtime = MockRuntime::new();
        let err = engine()
            .execute(&LoopConfig::while_condition("true"), json!(null), &runtime)
            .await
            .unwrap_err();

        assert!(matches!(err.root_cause(), LoopError::PotentialInfiniteLoop { repeats: 10 }));
        assert_eq!(runtime.iteration_calls(), 21);
    }

    #[tokio::test]
    async fn test_while_constant_condition_under_threshold() {
        let runtime = MockRuntime::new();
        let config = LoopConfig::while_condition("true").with_max_iterations(20);
        let report = engine().execute_detailed(&config, json!(null), &runtime).await.unwrap();
        assert_eq!(report.iterations, 20);
    }

    #[tokio::test]
    async fn test_cancellation_runs_completion() {
        let runtime = MockRuntime::new().deactivating_after(2);
        let report = engine()
            .execute_detailed(&LoopConfig::count(5), json!({"x": 1}), &runtime)
            .await
            .unwrap();

        assert_eq!(report.iterations, 2);
        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(runtime.completions(), vec![json!({"x": 1})]);
        assert!(runtime.has_log(LogLevel::Info, "Loop stopped after 2 iterations - flow deactivated"));
        assert!(runtime.has_log(LogLevel::Success, "Loop completed after 2 iterations"));
    }

    #[tokio::test]
    async fn test_downstream_failure_skips_completion() {
        let runtime = MockRuntime::new().failing_on(3);
        let err = engine()
            .execute(&LoopConfig::count(5), json!(null), &runtime)
            .await
            .unwrap_err();

        assert!(matches!(err, LoopError::ExecutionFailed { loop_type: LoopType::Count, .. }));
        assert!(matches!(err.root_cause(), LoopError::Downstream(_)));
        assert_eq!(runtime.iteration_calls(), 3);
        assert!(runtime.completions().is_empty());
    }

    #[tokio::test]
    async fn test_completion_failure_is_swallowed() {
        let runtime = MockRuntime::new().failing_completion(NodeError::execution("done", "boom"));
        let output = engine().execute(&LoopConfig::count(1), json!(1), &runtime).await.unwrap();

        assert_eq!(output, json!(1));
        assert!(runtime.has_log(LogLevel::Error, "Error in loop completion: Node done failed: boom"));
    }

    #[test]
    fn test_condition_snapshot_ignores_unread_bindings() {
        let config = LoopConfig::while_condition("item != null").with_names("i", "row");
        let mut context = LoopContext::new(json!(null), &config);
        let condition = Expression::parse("row != null").unwrap();
        let watched = watched_variables(&condition, &context);
        assert_eq!(watched, BTreeSet::from(["item".to_string()]));

        let first = condition_snapshot(true, &watched, &context.bindings());
        context.index = 5;
        let second = condition_snapshot(true, &watched, &context.bindings());
        assert_eq!(first, second);
        assert_eq!(first, json!({"result": true, "vars": {"item": null}}));
    }
}
