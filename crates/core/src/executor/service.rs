//! Response executor service
//!
//! One execution, in order:
//! 1. take a bulkhead slot
//! 2. run the handler; an `Err` or a panic becomes a failure response
//! 3. let the policy engine decorate the response
//! 4. run the attached actions
//! 5. account the outcome with the registry and the breakers, record metrics
//!
//! Steps 2 to 4 never fail the execution. The only errors that reach the
//! caller are contract violations: an unknown action type or using the
//! executor before `initialize`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use faultline_common::lifecycle::{AsyncManager, LifecycleState, ManagerHealth, ManagerStatus};
use faultline_common::resilience::Bulkhead;
use faultline_domain::constants::{
    ANNOTATION_EXECUTION_ID, ANNOTATION_EXECUTION_MODE, CODE_ASYNC_SCHEDULED,
    CODE_CIRCUIT_BREAKER_OPEN, CODE_EXECUTION_FAILED, CODE_HANDLER_FAILURE, CODE_POLICY_FAILURE,
};
use faultline_domain::{
    ErrorContext, ErrorResponse, ExecutorConfig, FaultlineError, ResponseStatus, Result,
};
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::actions::{ensure_known_actions, ActionRunner};
use super::metrics::{ExecutionMetrics, ExecutionMode, MetricsRecorder};
use crate::handler_ports::SharedHandler;
use crate::notification_ports::NotificationSink;
use crate::policy::PolicyEngine;
use crate::registry::ModuleRegistry;
use crate::router::ResponseRouter;
use crate::utils::require_running;

const COMPONENT: &str = "ResponseExecutor";

/// Handlers for a batch: one for every context, or one per context
#[derive(Clone)]
pub enum BatchHandlers {
    Shared(SharedHandler),
    PerContext(Vec<SharedHandler>),
}

impl From<SharedHandler> for BatchHandlers {
    fn from(handler: SharedHandler) -> Self {
        Self::Shared(handler)
    }
}

impl From<Vec<SharedHandler>> for BatchHandlers {
    fn from(handlers: Vec<SharedHandler>) -> Self {
        Self::PerContext(handlers)
    }
}

/// Executor status for the observability layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutorStatus {
    pub status: ManagerStatus,
    pub active_executions: usize,
    pub max_concurrent_executions: usize,
    pub pending_async: usize,
}

struct Inner {
    router: Arc<ResponseRouter>,
    engine: Arc<PolicyEngine>,
    registry: Arc<ModuleRegistry>,
    notifier: RwLock<Option<Arc<dyn NotificationSink>>>,
    bulkhead: Bulkhead,
    config: ExecutorConfig,
    metrics: Mutex<MetricsRecorder>,
    tasks: TaskTracker,
    lifecycle: LifecycleState,
}

/// Runs failures through handler, policies and actions
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ResponseExecutor {
    inner: Arc<Inner>,
}

impl ResponseExecutor {
    pub fn new(
        config: &ExecutorConfig,
        router: Arc<ResponseRouter>,
        engine: Arc<PolicyEngine>,
        registry: Arc<ModuleRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                router,
                engine,
                registry,
                notifier: RwLock::new(None),
                bulkhead: Bulkhead::new("response-executor", config.effective_concurrency()),
                config: config.clone(),
                metrics: Mutex::new(MetricsRecorder::default()),
                tasks: TaskTracker::new(),
                lifecycle: LifecycleState::new(),
            }),
        }
    }

    /// Deliver `notify` actions to `sink` instead of the log
    pub fn set_notification_sink(&self, sink: Arc<dyn NotificationSink>) {
        *self.inner.notifier.write() = Some(sink);
    }

    /// Route `ctx` and execute the selected handler
    pub async fn handle(&self, ctx: &ErrorContext) -> Result<ErrorResponse> {
        require_running(&self.inner.lifecycle, COMPONENT)?;
        let handler = self.inner.router.route(ctx)?;
        self.execute_sync(ctx, handler).await
    }

    /// Execute `handler` for `ctx` and wait for the final response
    #[instrument(skip_all, fields(error_id = %ctx.error_id, handler = handler.name()))]
    pub async fn execute_sync(
        &self,
        ctx: &ErrorContext,
        handler: SharedHandler,
    ) -> Result<ErrorResponse> {
        require_running(&self.inner.lifecycle, COMPONENT)?;
        self.inner.execute(ctx, &handler, ExecutionMode::Sync).await
    }

    /// Route `ctx` and schedule the selected handler
    pub fn handle_async(&self, ctx: ErrorContext) -> Result<ErrorResponse> {
        require_running(&self.inner.lifecycle, COMPONENT)?;
        let handler = self.inner.router.route(&ctx)?;
        self.execute_async(ctx, handler)
    }

    /// Schedule `handler` for `ctx` and return a placeholder at once
    ///
    /// The final response goes to the context's callback. Without a callback
    /// it is dropped after metrics were recorded.
    #[instrument(skip_all, fields(error_id = %ctx.error_id, handler = handler.name()))]
    pub fn execute_async(&self, ctx: ErrorContext, handler: SharedHandler) -> Result<ErrorResponse> {
        require_running(&self.inner.lifecycle, COMPONENT)?;

        let mut placeholder = ErrorResponse::new(
            &ctx.error_id,
            ResponseStatus::Partial,
            "Execution scheduled",
        )
        .with_code(CODE_ASYNC_SCHEDULED);
        placeholder.annotate(ANNOTATION_EXECUTION_MODE, ExecutionMode::Async.as_str());

        let inner = Arc::clone(&self.inner);
        self.inner.tasks.spawn(async move {
            let response = match inner.execute(&ctx, &handler, ExecutionMode::Async).await {
                Ok(response) => response,
                Err(err) => {
                    error!(error_id = %ctx.error_id, error = %err, "Async execution failed");
                    execution_failed(&ctx, &err)
                }
            };
            if !deliver(&ctx, response) {
                debug!(error_id = %ctx.error_id, "No callback, async result discarded");
            }
        });
        debug!("Async execution scheduled");
        Ok(placeholder)
    }

    /// Execute many contexts, `batch_size` at a time
    ///
    /// Always returns one response per context, in input order. An item
    /// that fails is answered with an `EXECUTION_FAILED` response. Each
    /// item's callback receives its final response.
    #[instrument(skip_all, fields(contexts = contexts.len()))]
    pub async fn execute_batch(
        &self,
        contexts: Vec<ErrorContext>,
        handlers: impl Into<BatchHandlers>,
    ) -> Result<Vec<ErrorResponse>> {
        require_running(&self.inner.lifecycle, COMPONENT)?;

        let handlers = match handlers.into() {
            BatchHandlers::Shared(handler) => vec![handler; contexts.len()],
            BatchHandlers::PerContext(handlers) => {
                if handlers.len() != contexts.len() {
                    return Err(FaultlineError::HandlerCountMismatch {
                        contexts: contexts.len(),
                        handlers: handlers.len(),
                    });
                }
                handlers
            }
        };

        let batch_size = self.inner.config.effective_batch_size();
        let mut responses = Vec::with_capacity(contexts.len());
        let mut items = contexts.into_iter().zip(handlers).peekable();
        while items.peek().is_some() {
            let chunk: Vec<_> = items.by_ref().take(batch_size).collect();
            let results = join_all(
                chunk
                    .iter()
                    .map(|(ctx, handler)| self.inner.execute(ctx, handler, ExecutionMode::Batch)),
            )
            .await;

            for ((ctx, _), result) in chunk.iter().zip(results) {
                let response = result.unwrap_or_else(|err| {
                    warn!(error_id = %ctx.error_id, error = %err, "Batch item failed");
                    execution_failed(ctx, &err)
                });
                deliver(ctx, response.clone());
                responses.push(response);
            }
        }
        debug!(responses = responses.len(), "Batch complete");
        Ok(responses)
    }

    /// Route every context and execute them as one batch
    pub async fn handle_batch(&self, contexts: Vec<ErrorContext>) -> Result<Vec<ErrorResponse>> {
        require_running(&self.inner.lifecycle, COMPONENT)?;
        let handlers = contexts
            .iter()
            .map(|ctx| self.inner.router.route(ctx))
            .collect::<Result<Vec<_>>>()?;
        self.execute_batch(contexts, BatchHandlers::PerContext(handlers)).await
    }

    /// Change the concurrency bound at runtime; values below 1 act as 1
    pub fn set_max_concurrent_executions(&self, max: usize) -> usize {
        let effective = self.inner.bulkhead.resize(max);
        info!(requested = max, effective, "Executor concurrency changed");
        effective
    }

    pub fn metrics(&self) -> ExecutionMetrics {
        let mut metrics = self.inner.metrics.lock().snapshot();
        metrics.active_executions = self.inner.bulkhead.current_concurrent();
        metrics.max_concurrent_executions = self.inner.bulkhead.max_concurrent();
        metrics
    }

    pub fn status_report(&self) -> ExecutorStatus {
        ExecutorStatus {
            status: self.inner.lifecycle.get(),
            active_executions: self.inner.bulkhead.current_concurrent(),
            max_concurrent_executions: self.inner.bulkhead.max_concurrent(),
            pending_async: self.inner.tasks.len(),
        }
    }
}

impl Inner {
    async fn execute(
        &self,
        ctx: &ErrorContext,
        handler: &SharedHandler,
        mode: ExecutionMode,
    ) -> Result<ErrorResponse> {
        let _permit = self.bulkhead.acquire().await?;
        let started = Instant::now();
        let execution_id = format!("exec_{}_{}", ctx.error_id, Uuid::new_v4().simple());

        let mut response = match AssertUnwindSafe(handler.execute(ctx)).catch_unwind().await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                warn!(%execution_id, handler = handler.name(), error = %err, "Handler failed");
                ErrorResponse::failure(
                    &ctx.error_id,
                    handler_failure_code(mode),
                    format!("Handler '{}' failed: {err:#}", handler.name()),
                )
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                warn!(%execution_id, handler = handler.name(), reason, "Handler panicked");
                ErrorResponse::failure(
                    &ctx.error_id,
                    handler_failure_code(mode),
                    format!("Handler '{}' panicked: {reason}", handler.name()),
                )
            }
        };
        response.error_id = ctx.error_id.clone();
        response.annotate(ANNOTATION_EXECUTION_ID, execution_id.as_str());
        response.annotate(ANNOTATION_EXECUTION_MODE, mode.as_str());

        let annotations = response.annotations.clone();
        let mut response = match self.engine.apply_policies(ctx, response) {
            Ok(response) => response,
            Err(err) => {
                warn!(%execution_id, error = %err, "Policy evaluation failed");
                let mut failed = ErrorResponse::failure(
                    &ctx.error_id,
                    CODE_POLICY_FAILURE,
                    format!("Policy evaluation failed: {err}"),
                );
                failed.annotations = annotations;
                failed
            }
        };

        ensure_known_actions(&response)?;
        let runner = ActionRunner {
            notifier: self.notifier.read().clone(),
            max_retry_wait: self.config.max_retry_wait,
        };
        runner.run_all(ctx, &mut response).await;

        let handled = response.status().is_handled();
        self.account(ctx, &response, handled);

        let elapsed = started.elapsed();
        response.processing_time = elapsed;
        self.metrics.lock().record(mode, elapsed, handled);
        debug!(
            %execution_id,
            status = %response.status(),
            code = ?response.code(),
            actions = response.actions.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Execution finished"
        );
        Ok(response)
    }

    /// Feed the outcome into module health and circuit breakers
    fn account(&self, ctx: &ErrorContext, response: &ErrorResponse, handled: bool) {
        let module_id = ctx.module_id();
        let counted = if handled {
            self.registry.increment_success(module_id)
        } else {
            self.registry.increment_error(module_id)
        };
        if let Err(err) = counted {
            warn!(module_id, error = %err, "Module outcome not recorded");
        }

        // A short-circuited call says nothing about the module itself.
        if response.code() == Some(CODE_CIRCUIT_BREAKER_OPEN) {
            return;
        }
        if let Err(err) = self.engine.record_outcome(module_id, &ctx.error_id, handled) {
            warn!(module_id, error = %err, "Circuit breaker outcome not recorded");
        }
    }
}

fn handler_failure_code(mode: ExecutionMode) -> &'static str {
    match mode {
        ExecutionMode::Batch => CODE_EXECUTION_FAILED,
        ExecutionMode::Sync | ExecutionMode::Async => CODE_HANDLER_FAILURE,
    }
}

/// Response for an execution that could not produce one itself
fn execution_failed(ctx: &ErrorContext, err: &FaultlineError) -> ErrorResponse {
    ErrorResponse::failure(&ctx.error_id, CODE_EXECUTION_FAILED, format!("Execution failed: {err}"))
}

/// Hand `response` to the context's callback; a panicking callback is logged
fn deliver(ctx: &ErrorContext, response: ErrorResponse) -> bool {
    match std::panic::catch_unwind(AssertUnwindSafe(|| ctx.notify(response))) {
        Ok(delivered) => delivered,
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            warn!(error_id = %ctx.error_id, reason, "Callback panicked");
            true
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[async_trait]
impl AsyncManager for ResponseExecutor {
    type Error = FaultlineError;

    async fn initialize(&self) -> Result<()> {
        if self.inner.lifecycle.begin_initialize() {
            self.inner.lifecycle.set(ManagerStatus::Running);
            info!(
                max_concurrent = self.inner.bulkhead.max_concurrent(),
                batch_size = self.inner.config.effective_batch_size(),
                "Response executor initialized"
            );
        }
        Ok(())
    }

    /// Stop accepting work and wait for scheduled async executions
    async fn shutdown(&self) -> Result<()> {
        if !self.inner.lifecycle.begin_shutdown() {
            return Ok(());
        }
        let pending = self.inner.tasks.len();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
        self.inner.lifecycle.set(ManagerStatus::Shutdown);
        info!(drained = pending, "Response executor shut down");
        Ok(())
    }

    async fn health_check(&self) -> Result<ManagerHealth> {
        if !self.inner.lifecycle.is_running() {
            return Ok(ManagerHealth::unhealthy(format!(
                "executor is {}",
                self.inner.lifecycle.get()
            )));
        }
        let bulkhead = self.inner.bulkhead.metrics();
        if bulkhead.is_at_capacity() && bulkhead.waiting > 0 {
            Ok(ManagerHealth::degraded(0.75, bulkhead.status_message()))
        } else {
            Ok(ManagerHealth::healthy())
        }
    }

    fn status(&self) -> ManagerStatus {
        self.inner.lifecycle.get()
    }

    fn name(&self) -> &'static str {
        COMPONENT
    }
}
