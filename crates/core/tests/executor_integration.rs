//! Integration tests for sync, async and batch execution

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use faultline_common::lifecycle::AsyncManager;
use faultline_common::resilience::CircuitBreakerConfig;
use faultline_core::{
    handler_fn, BatchHandlers, ExecutionMode, ModuleRegistration, PolicyEngine, ResponseExecutor,
    ResponseRouter, ModuleRegistry, SharedHandler,
};
use faultline_domain::constants::{
    ANNOTATION_EXECUTION_ID, ANNOTATION_EXECUTION_MODE, CODE_ASYNC_SCHEDULED,
    CODE_EXECUTION_FAILED, CODE_FALLBACK_ACTIVATED, CODE_HANDLER_FAILURE,
};
use faultline_domain::{
    Action, ActionType, ErrorPolicy, ErrorResponse, FallbackConfig, FaultlineConfig,
    FaultlineError, PolicyKind, ResponseStatus, RouteCondition,
};
use serde_json::{json, Value};
use support::{
    fast_config, handled_by, init_tracing, quiet_context, started_center, Behavior,
    CountingHandler,
};
use tokio::sync::mpsc;

/// Bare executor over freshly initialized components
async fn executor(config: &FaultlineConfig) -> ResponseExecutor {
    init_tracing();
    let router = Arc::new(ResponseRouter::default());
    let engine = Arc::new(PolicyEngine::new(config));
    let registry = Arc::new(ModuleRegistry::new(config.registry.clone()));
    router.initialize().await.unwrap();
    engine.initialize().await.unwrap();
    registry.initialize().await.unwrap();

    let executor = ResponseExecutor::new(&config.executor, router, engine, registry);
    executor.initialize().await.unwrap();
    executor
}

/// Handler that tracks how many invocations overlap
fn gauge_handler(active: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> SharedHandler {
    handler_fn("gauge", move |ctx| {
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(ErrorResponse::success(&ctx.error_id, "ok"))
        }
    })
}

#[tokio::test]
async fn test_sync_execution_annotates_response() {
    let executor = executor(&fast_config()).await;
    let handler = CountingHandler::new("cache", Behavior::Succeed);
    let ctx = quiet_context("openai");

    let response = executor.execute_sync(&ctx, handler.shared()).await.unwrap();
    assert_eq!(response.error_id, ctx.error_id);
    assert_eq!(response.status(), ResponseStatus::Success);
    assert_eq!(response.annotation(ANNOTATION_EXECUTION_MODE), Some(&json!("sync")));
    let execution_id = response.annotation(ANNOTATION_EXECUTION_ID).unwrap().as_str().unwrap();
    assert!(execution_id.starts_with(&format!("exec_{}_", ctx.error_id)));
}

/// Validates that handler errors and panics become failure responses
/// instead of escaping to the caller.
#[tokio::test]
async fn test_handler_failures_are_contained() {
    let executor = executor(&fast_config()).await;

    for behavior in [Behavior::Error, Behavior::Panic] {
        let handler = CountingHandler::new("provider", behavior);
        let response = executor.execute_sync(&quiet_context("openai"), handler.shared()).await;
        let response = response.unwrap();
        assert_eq!(response.status(), ResponseStatus::Failure);
        assert_eq!(response.code(), Some(CODE_HANDLER_FAILURE));
        assert!(response.result.message.contains("provider"));
    }
    assert_eq!(executor.metrics().failed_executions, 2);
}

#[tokio::test]
async fn test_unknown_action_type_is_rejected() {
    let executor = executor(&fast_config()).await;
    let handler = handler_fn("teleporter", |ctx| async move {
        Ok(ErrorResponse::success(&ctx.error_id, "ok").with_action(Action::new(
            ActionType::Other("teleport".into()),
            "elsewhere",
            Value::Null,
        )))
    });

    let err = executor.execute_sync(&quiet_context("openai"), handler).await.unwrap_err();
    assert_eq!(err, FaultlineError::UnknownActionType("teleport".into()));
}

/// Validates async delivery: a placeholder comes back at once and the final
/// response reaches the context's callback.
#[tokio::test]
async fn test_async_result_reaches_callback() {
    let executor = executor(&fast_config()).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let ctx = quiet_context("openai").with_callback(move |response| {
        let _ = tx.send(response);
    });
    let error_id = ctx.error_id.clone();

    let placeholder =
        executor.execute_async(ctx, CountingHandler::new("slow", Behavior::Succeed).shared()).unwrap();
    assert_eq!(placeholder.status(), ResponseStatus::Partial);
    assert_eq!(placeholder.code(), Some(CODE_ASYNC_SCHEDULED));

    let delivered = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(delivered.error_id, error_id);
    assert_eq!(delivered.status(), ResponseStatus::Success);
    assert_eq!(delivered.annotation(ANNOTATION_EXECUTION_MODE), Some(&json!("async")));
}

#[tokio::test]
async fn test_shutdown_waits_for_async_work() {
    let executor = executor(&fast_config()).await;
    let handler = CountingHandler::new("slow", Behavior::Succeed);
    for _ in 0..3 {
        executor.execute_async(quiet_context("openai"), handler.shared()).unwrap();
    }

    executor.shutdown().await.unwrap();
    assert_eq!(executor.metrics().async_executions, 3);
    assert_eq!(executor.status_report().pending_async, 0);
}

/// Validates batch resilience: one failing item never fails the batch,
/// responses keep input order and every callback fires.
///
/// # Test Steps
/// 1. Build a batch larger than `batch_size` with one failing handler
/// 2. Verify one response per context, in order
/// 3. Verify the failing item is coded `EXECUTION_FAILED`
/// 4. Verify each callback received its own response
#[tokio::test]
async fn test_batch_isolates_item_failures() {
    let mut config = fast_config();
    config.executor.batch_size = 2;
    let executor = executor(&config).await;

    let delivered = Arc::new(AtomicUsize::new(0));
    let contexts: Vec<_> = (0..5)
        .map(|_| {
            let delivered = Arc::clone(&delivered);
            quiet_context("openai").with_callback(move |_| {
                delivered.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();
    let ids: Vec<_> = contexts.iter().map(|ctx| ctx.error_id.clone()).collect();
    let handlers: Vec<SharedHandler> = (0..5)
        .map(|i| {
            let behavior = if i == 2 { Behavior::Panic } else { Behavior::Succeed };
            CountingHandler::new(&format!("h{i}"), behavior).shared()
        })
        .collect();

    let responses = executor.execute_batch(contexts, handlers).await.unwrap();
    assert_eq!(responses.len(), 5);
    assert_eq!(responses.iter().map(|r| r.error_id.clone()).collect::<Vec<_>>(), ids);
    assert_eq!(responses[2].code(), Some(CODE_EXECUTION_FAILED));
    for (i, response) in responses.iter().enumerate().filter(|(i, _)| *i != 2) {
        assert_eq!(handled_by(response), Some(format!("h{i}").as_str()));
    }
    assert_eq!(delivered.load(Ordering::SeqCst), 5);

    let metrics = executor.metrics();
    assert_eq!(metrics.batch_executions, 5);
    assert_eq!(metrics.failed_executions, 1);
}

#[tokio::test]
async fn test_batch_survives_panicking_callback() {
    let executor = executor(&fast_config()).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let contexts = vec![
        quiet_context("openai").with_callback(|_| panic!("caller callback broke")),
        quiet_context("openai").with_callback(move |response| {
            let _ = tx.send(response);
        }),
    ];
    let ids: Vec<_> = contexts.iter().map(|ctx| ctx.error_id.clone()).collect();

    let handler = CountingHandler::new("ok", Behavior::Succeed);
    let responses = executor.execute_batch(contexts, handler.shared()).await.unwrap();
    assert_eq!(responses.len(), 2);
    assert!(responses.iter().all(|r| r.status() == ResponseStatus::Success));
    assert_eq!(rx.try_recv().unwrap().error_id, ids[1]);
}

#[tokio::test]
async fn test_batch_handler_count_must_match() {
    let executor = executor(&fast_config()).await;
    let handlers = vec![CountingHandler::new("only", Behavior::Succeed).shared()];
    let contexts = vec![quiet_context("openai"), quiet_context("openai")];

    let err = executor.execute_batch(contexts, BatchHandlers::PerContext(handlers)).await;
    assert_eq!(err.unwrap_err(), FaultlineError::HandlerCountMismatch { contexts: 2, handlers: 1 });
}

#[tokio::test]
async fn test_failed_batch_item_can_be_rescued_by_fallback() {
    let center = started_center(fast_config()).await;
    let handler = CountingHandler::new("openai", Behavior::Error);
    let fallback = ErrorPolicy::new(
        "openai-fallback",
        "Cached completion",
        PolicyKind::Fallback(FallbackConfig::default()),
    )
    .with_condition(RouteCondition::for_modules(["openai"]));
    center
        .register_module(
            ModuleRegistration::new("openai", "OpenAI", "1.0.0")
                .with_handler(handler.shared())
                .with_policy(fallback),
        )
        .await
        .unwrap();

    let responses =
        center.handle_batch(vec![quiet_context("openai"), quiet_context("anthropic")]).await.unwrap();
    assert_eq!(responses[0].status(), ResponseStatus::Fallback);
    assert_eq!(responses[0].code(), Some(CODE_FALLBACK_ACTIVATED));
    assert_eq!(responses[1].status(), ResponseStatus::Failure);
    assert_eq!(responses[0].annotation(ANNOTATION_EXECUTION_MODE), Some(&json!("batch")));
}

/// Validates that concurrent executions never exceed the configured bound,
/// also after the bound is changed at runtime.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_bound() {
    let mut config = fast_config();
    config.executor.max_concurrent_executions = 2;
    config.executor.batch_size = 8;
    let executor = executor(&config).await;

    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let handler = gauge_handler(Arc::clone(&active), Arc::clone(&peak));
    let contexts = (0..8).map(|_| quiet_context("openai")).collect();

    executor.execute_batch(contexts, handler.clone()).await.unwrap();
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(executor.metrics().max_concurrent_executions, 2);

    assert_eq!(executor.set_max_concurrent_executions(0), 1);
    peak.store(0, Ordering::SeqCst);
    let contexts = (0..4).map(|_| quiet_context("openai")).collect();
    executor.execute_batch(contexts, handler).await.unwrap();
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_metrics_track_modes_and_durations() {
    let executor = executor(&fast_config()).await;
    let handler = CountingHandler::new("ok", Behavior::Succeed);

    executor.execute_sync(&quiet_context("openai"), handler.shared()).await.unwrap();
    executor.execute_batch(vec![quiet_context("openai")], handler.shared()).await.unwrap();

    let metrics = executor.metrics();
    assert_eq!(metrics.total_executions, 2);
    assert_eq!(metrics.successful_executions, 2);
    assert_eq!(metrics.sync_executions, 1);
    assert_eq!(metrics.batch_executions, 1);
    assert_eq!(metrics.active_executions, 0);
    assert!(metrics.p95_duration_ms >= 0.0);
    assert_eq!(ExecutionMode::Batch.as_str(), "batch");
}

/// Validates that concurrent executions against one module lose no
/// outcome in module health or in its circuit breaker.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_executions_keep_counters_consistent() {
    const FAILURES: usize = 24;
    const SUCCESSES: usize = 24;

    let mut config = fast_config();
    config.executor.max_concurrent_executions = 8;
    let center = Arc::new(started_center(config).await);
    let breaker = CircuitBreakerConfig::new(1_000, Duration::from_secs(60));
    let isolation = ErrorPolicy::new("openai-isolation", "Isolate", PolicyKind::Isolation(breaker))
        .with_condition(RouteCondition::for_modules(["openai"]));
    let failing = CountingHandler::new("openai", Behavior::FailWith("BAD_INPUT"));
    let healthy = CountingHandler::new("anthropic", Behavior::Succeed);
    center
        .register_module(
            ModuleRegistration::new("openai", "OpenAI", "1.0.0")
                .with_handler(failing.shared())
                .with_policy(isolation),
        )
        .await
        .unwrap();
    center
        .register_module(
            ModuleRegistration::new("anthropic", "Anthropic", "1.0.0")
                .with_handler(healthy.shared()),
        )
        .await
        .unwrap();

    let tasks: Vec<_> = (0..FAILURES + SUCCESSES)
        .map(|i| {
            let center = Arc::clone(&center);
            let module = if i % 2 == 0 { "openai" } else { "anthropic" };
            tokio::spawn(async move { center.handle(&quiet_context(module)).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let health = center.module_health().unwrap();
    let openai = &health["openai"];
    assert_eq!(openai.error_count as usize, FAILURES);
    assert_eq!(openai.success_count, 0);
    let anthropic = &health["anthropic"];
    assert_eq!(anthropic.success_count as usize + anthropic.error_count as usize, SUCCESSES);
    assert_eq!(anthropic.success_count as usize, SUCCESSES);
    assert_eq!(failing.calls() + healthy.calls(), FAILURES + SUCCESSES);

    let snapshot = center.engine().circuit_breaker_state("openai").unwrap().unwrap();
    assert_eq!(snapshot.failure_count as usize, FAILURES);
}
