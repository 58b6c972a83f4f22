//! Loop engine integration tests
//!
//! Drives `LoopEngine` through the public API against both the mock
//! runtime and a real in-memory graph.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use flowloop::config::{EngineConfig, LoopConfig, LoopType};
use flowloop::domain::{LogLevel, StopReason};
use flowloop::error::LoopError;
use flowloop::runtime::{
    ActivationFlag, COMPLETE_PORT, FlowGraph, FlowRuntime, FnNode, ITERATION_PORT, MockRuntime, NodeError,
};
use flowloop::LoopEngine;
use serde_json::{Value, json};

/// Count loops never exceed min(count, maxIterations)
#[tokio::test]
async fn test_count_bound() {
    for (count, max, expected) in [(5, 1000, 5), (10, 3, 3), (1, 1, 1)] {
        let runtime = MockRuntime::new();
        let config = LoopConfig::count(count).with_max_iterations(max);
        let report = LoopEngine::default()
            .execute_detailed(&config, json!(null), &runtime)
            .await
            .unwrap();
        assert_eq!(report.iterations, expected);
        assert_eq!(runtime.iteration_calls(), expected);
        assert_eq!(runtime.logs_at(LogLevel::Warning).is_empty(), count <= max);
    }
}

/// ForEach processes exactly min(len, maxIterations) items in order
#[tokio::test]
async fn test_for_each_truncation_preserves_order() {
    let runtime = MockRuntime::new().with_responder(|ctx| Ok(vec![ctx["item"].clone()]));
    let config = LoopConfig::for_each("list")
        .with_max_iterations(3)
        .with_collect_results(true);
    let output = LoopEngine::default()
        .execute(&config, json!({"list": ["a", "b", "c", "d", "e"]}), &runtime)
        .await
        .unwrap();

    assert_eq!(output["results"], json!(["a", "b", "c"]));
    assert!(runtime.has_log(LogLevel::Warning, "Array has 5 items, limiting to 3 iterations"));
}

/// Dotted array paths resolve through nested objects and array indices
#[tokio::test]
async fn test_for_each_nested_path() {
    let runtime = MockRuntime::new().with_responder(|ctx| Ok(vec![ctx["row"].clone()]));
    let config = LoopConfig::for_each("groups.1.members")
        .with_names("n", "row")
        .with_collect_results(true);
    let input = json!({"groups": [{"members": [0]}, {"members": [7, 8]}]});
    let output = LoopEngine::default().execute(&config, input, &runtime).await.unwrap();

    assert_eq!(output["results"], json!([7, 8]));
    assert_eq!(output["groups"][1]["members"], json!([7, 8]));
}

/// A path that does not end at an array fails before any iteration
#[tokio::test]
async fn test_for_each_path_to_non_array() {
    let runtime = MockRuntime::new();
    let err = LoopEngine::default()
        .execute(&LoopConfig::for_each("a.b"), json!({"a": {"b": "text"}}), &runtime)
        .await
        .unwrap_err();

    assert!(matches!(err.root_cause(), LoopError::InvalidArrayPath { .. }));
    assert_eq!(runtime.iteration_calls(), 0);
}

/// While loops stop as soon as the condition is false
#[tokio::test]
async fn test_while_termination() {
    let runtime = MockRuntime::new().with_responder(|ctx| Ok(vec![ctx["index"].clone()]));
    let config = LoopConfig::while_condition("index < input.stop").with_collect_results(true);
    let report = LoopEngine::default()
        .execute_detailed(&config, json!({"stop": 4}), &runtime)
        .await
        .unwrap();

    assert_eq!(report.iterations, 4);
    assert_eq!(report.stop_reason, StopReason::ConditionFalse);
    assert_eq!(report.output["results"], json!([0, 1, 2, 3]));
}

/// A condition that stays true with unchanged inputs is flagged after 21 passes
#[tokio::test]
async fn test_infinite_loop_detection() {
    let runtime = MockRuntime::new();
    let err = LoopEngine::default()
        .execute(&LoopConfig::while_condition("input.running"), json!({"running": true}), &runtime)
        .await
        .unwrap_err();

    assert!(matches!(err.root_cause(), LoopError::PotentialInfiniteLoop { .. }));
    assert_eq!(runtime.iteration_calls(), 21);
    assert!(runtime.completions().is_empty());
    assert!(
        err.to_string()
            .starts_with("while loop execution failed: Potential infinite loop detected")
    );
}

/// A counter condition is never mistaken for an infinite loop
#[tokio::test]
async fn test_counter_condition_not_flagged() {
    let runtime = MockRuntime::new();
    let report = LoopEngine::default()
        .execute_detailed(&LoopConfig::while_condition("index < 50"), json!(null), &runtime)
        .await
        .unwrap();
    assert_eq!(report.iterations, 50);
}

/// A smaller history window trips earlier
#[tokio::test]
async fn test_history_capacity_is_configurable() {
    let engine = LoopEngine::new(EngineConfig {
        condition_history: 3,
        ..EngineConfig::default()
    });
    let runtime = MockRuntime::new();
    let err = engine
        .execute(&LoopConfig::while_condition("1 < 2"), json!(null), &runtime)
        .await
        .unwrap_err();

    assert!(matches!(err.root_cause(), LoopError::PotentialInfiniteLoop { repeats: 3 }));
    assert_eq!(runtime.iteration_calls(), 7);
}

/// Results hold every downstream output, flattened, in order
#[tokio::test]
async fn test_result_collection_flattens() {
    let runtime = MockRuntime::new().with_responder(|ctx| {
        let i = ctx["index"].as_u64().unwrap_or(0);
        Ok(vec![json!(i), json!(i * 10)])
    });
    let config = LoopConfig::count(2).with_collect_results(true);
    let output = LoopEngine::default()
        .execute(&config, json!({"keep": true}), &runtime)
        .await
        .unwrap();

    assert_eq!(output, json!({"keep": true, "results": [0, 0, 1, 10]}));
}

/// Deactivating the flow stops the loop but still runs Complete
#[tokio::test]
async fn test_cancellation_mid_loop() {
    let runtime = MockRuntime::new()
        .deactivating_after(2)
        .with_outputs(vec![json!("r")]);
    let config = LoopConfig::count(10).with_collect_results(true);
    let report = LoopEngine::default()
        .execute_detailed(&config, json!(null), &runtime)
        .await
        .unwrap();

    assert_eq!(report.iterations, 2);
    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert_eq!(runtime.completions(), vec![json!({"results": ["r", "r"]})]);
    assert!(runtime.has_log(LogLevel::Info, "Loop stopped after 2 iterations - flow deactivated"));
}

/// A failing iteration aborts the loop and skips Complete
#[tokio::test]
async fn test_fail_fast() {
    let runtime = MockRuntime::new().failing_on(3);
    let err = LoopEngine::default()
        .execute(&LoopConfig::for_each(""), json!([1, 2, 3, 4, 5]), &runtime)
        .await
        .unwrap_err();

    assert!(matches!(err, LoopError::ExecutionFailed { loop_type: LoopType::ForEach, .. }));
    assert_eq!(runtime.iteration_calls(), 3);
    assert!(runtime.completions().is_empty());
    assert!(runtime.has_log(LogLevel::Error, "forEach loop error: Error in loop iteration"));
    assert!(!runtime.has_log(LogLevel::Success, "Loop completed"));
}

/// Default count loop over a real graph
#[tokio::test]
async fn test_count_five_through_graph() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let completed = Arc::new(Mutex::new(Vec::new()));

    let mut graph = FlowGraph::new();
    let seen_by_node = seen.clone();
    let completed_by_node = completed.clone();
    graph
        .add_node(
            "record",
            FnNode::new(move |ctx: Value| {
                seen_by_node.lock().unwrap().push(ctx["index"].clone());
                Ok(json!(ctx["index"].as_u64().unwrap_or(0) * 2))
            }),
        )
        .add_node(
            "done",
            FnNode::new(move |output: Value| {
                completed_by_node.lock().unwrap().push(output.clone());
                Ok(output)
            }),
        )
        .connect("loop", ITERATION_PORT, "record")
        .connect("loop", COMPLETE_PORT, "done");

    let runtime = FlowRuntime::new(Arc::new(graph), "loop", LoopType::Count, ActivationFlag::new());
    let config = LoopConfig::from_settings(&json!({})).unwrap();
    let output = LoopEngine::default().execute(&config, json!("seed"), &runtime).await.unwrap();

    assert_eq!(output, json!("seed"));
    assert_eq!(*seen.lock().unwrap(), vec![json!(0), json!(1), json!(2), json!(3), json!(4)]);
    assert_eq!(*completed.lock().unwrap(), vec![json!("seed")]);
    assert_eq!(runtime.last_progress().map(|p| (p.completed, p.total)), Some((5, Some(5))));

    let events = runtime.events();
    assert!(events.iter().all(|e| e.level != LogLevel::Warning));
    let messages: Vec<String> = events.into_iter().map(|e| e.message).collect();
    assert!(messages.contains(&"Loop completed after 5 iterations".to_string()));
}

/// Oversized conditions fail as condition errors instead of exhausting the stack
#[tokio::test]
async fn test_long_condition_is_condition_error() {
    let runtime = MockRuntime::new();
    let condition = format!("{}index < 3", "index + ".repeat(10_000));
    let err = LoopEngine::default()
        .execute(&LoopConfig::while_condition(&condition), json!(null), &runtime)
        .await
        .unwrap_err();

    assert!(matches!(err.root_cause(), LoopError::ConditionEvaluation(_)));
    assert_eq!(runtime.iteration_calls(), 0);
}

/// Graph node failures surface as downstream errors
#[tokio::test]
async fn test_graph_failure_is_downstream_error() {
    let mut graph = FlowGraph::new();
    graph
        .add_node("boom", FnNode::new(|_| Err(NodeError::execution("boom", "bad input"))))
        .connect("loop", ITERATION_PORT, "boom");
    let runtime = FlowRuntime::new(Arc::new(graph), "loop", LoopType::Count, ActivationFlag::new());

    let err = LoopEngine::default()
        .execute(&LoopConfig::count(3), json!(null), &runtime)
        .await
        .unwrap_err();
    match err.root_cause() {
        LoopError::Downstream(NodeError::Execution { node, message }) => {
            assert_eq!(node, "boom");
            assert_eq!(message, "bad input");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

/// Heartbeats report progress once the interval has passed
#[tokio::test(start_paused = true)]
async fn test_heartbeat_and_slow_warning() {
    let runtime = MockRuntime::new();
    let config = LoopConfig::count(6).with_delay_ms(6_000);
    let started = tokio::time::Instant::now();
    LoopEngine::default().execute(&config, json!(null), &runtime).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(36));
    let heartbeats = runtime.logs_at(LogLevel::Info);
    assert!(heartbeats.contains(&"Loop still running: 1 iterations completed".to_string()));
    assert!(heartbeats.contains(&"Loop still running: 6 iterations completed".to_string()));

    let warnings = runtime.logs_at(LogLevel::Warning);
    assert_eq!(
        warnings,
        vec!["Loop has been running for 36 seconds. Consider adding a delay or reducing iterations.".to_string()]
    );
}

/// Short loops never emit heartbeats
#[tokio::test(start_paused = true)]
async fn test_no_heartbeat_for_fast_loop() {
    let runtime = MockRuntime::new();
    let config = LoopConfig::count(3).with_delay_ms(1_000);
    LoopEngine::default().execute(&config, json!(null), &runtime).await.unwrap();
    assert!(!runtime.has_log(LogLevel::Info, "Loop still running"));
}
