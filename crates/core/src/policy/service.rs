//! Policy engine service
//!
//! Owns the registered policies plus the two pieces of cross-execution
//! state they drive: circuit breakers keyed by module id and retry states
//! keyed by error id. `apply_policies` never fails because one policy did;
//! failing policies are logged, skipped and listed in the response
//! annotations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use faultline_common::lifecycle::{
    AsyncManager, ComponentHealth, LifecycleState, ManagerHealth, ManagerStatus,
};
use faultline_common::resilience::{
    CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerSnapshot, CircuitState, Clock,
    RetryState, SystemClock,
};
use faultline_common::ErrorClassification;
use faultline_domain::constants::{
    ANNOTATION_POLICIES_APPLIED, ANNOTATION_POLICY_ERRORS, ANNOTATION_RETRY_AFTER_MS,
    ANNOTATION_RETRY_EXHAUSTED, CODE_CIRCUIT_BREAKER_OPEN, CODE_FALLBACK_ACTIVATED,
    CODE_RETRY_SCHEDULED, DEFAULT_NOTIFICATION_CHANNEL,
};
use faultline_domain::{
    Action, ActionType, ContextView, ErrorContext, ErrorPolicy, ErrorResponse, FallbackConfig,
    FaultlineConfig, FaultlineError, NotificationConfig, PolicyKind, ResponseStatus, Result,
    RetryPolicyConfig,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use super::defaults::default_policies;
use crate::utils::require_running;

const COMPONENT: &str = "PolicyEngine";

/// Whether evaluation continues after a policy ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Halt,
}

/// Policy engine status for the observability layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyEngineStatus {
    pub status: ManagerStatus,
    pub policy_count: usize,
    pub enabled_count: usize,
    pub tracked_breakers: usize,
    pub open_breakers: usize,
    pub retry_states: usize,
}

/// Matches policies against failures and applies them
pub struct PolicyEngine {
    /// Sorted by priority, highest first; ties keep registration order
    policies: RwLock<Vec<ErrorPolicy>>,
    breakers: CircuitBreakerRegistry<Arc<dyn Clock>>,
    retries: Mutex<HashMap<String, RetryState>>,
    config: FaultlineConfig,
    lifecycle: LifecycleState,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new(&FaultlineConfig::default())
    }
}

impl PolicyEngine {
    pub fn new(config: &FaultlineConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Engine whose breakers read time from `clock`
    pub fn with_clock(config: &FaultlineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            policies: RwLock::new(Vec::new()),
            breakers: CircuitBreakerRegistry::with_clock(clock),
            retries: Mutex::new(HashMap::new()),
            config: config.clone(),
            lifecycle: LifecycleState::new(),
        }
    }

    /// Register or replace a policy
    #[instrument(skip(self, policy), fields(policy_id = %policy.policy_id, kind = policy.kind.name()))]
    pub fn register_policy(&self, policy: ErrorPolicy) -> Result<()> {
        require_running(&self.lifecycle, COMPONENT)?;
        policy.validate()?;

        let mut policies = self.policies.write();
        policies.retain(|existing| existing.policy_id != policy.policy_id);
        let position = policies.partition_point(|existing| existing.priority >= policy.priority);
        info!(priority = policy.priority, "Policy registered");
        policies.insert(position, policy);
        Ok(())
    }

    pub fn unregister_policy(&self, policy_id: &str) -> Result<ErrorPolicy> {
        require_running(&self.lifecycle, COMPONENT)?;
        let mut policies = self.policies.write();
        let index = policies
            .iter()
            .position(|policy| policy.policy_id == policy_id)
            .ok_or_else(|| FaultlineError::PolicyNotFound(policy_id.to_string()))?;
        info!(policy_id, "Policy unregistered");
        Ok(policies.remove(index))
    }

    /// Registered policies, highest priority first
    pub fn list_policies(&self) -> Result<Vec<ErrorPolicy>> {
        require_running(&self.lifecycle, COMPONENT)?;
        Ok(self.policies.read().clone())
    }

    pub fn get_policy(&self, policy_id: &str) -> Result<Option<ErrorPolicy>> {
        require_running(&self.lifecycle, COMPONENT)?;
        Ok(self.policies.read().iter().find(|policy| policy.policy_id == policy_id).cloned())
    }

    pub fn set_policy_enabled(&self, policy_id: &str, enabled: bool) -> Result<()> {
        require_running(&self.lifecycle, COMPONENT)?;
        let mut policies = self.policies.write();
        let policy = policies
            .iter_mut()
            .find(|policy| policy.policy_id == policy_id)
            .ok_or_else(|| FaultlineError::PolicyNotFound(policy_id.to_string()))?;
        policy.enabled = enabled;
        debug!(policy_id, enabled, "Policy toggled");
        Ok(())
    }

    /// Run every enabled, matching policy over `response`
    ///
    /// Each policy works on a copy that is committed only when the policy
    /// succeeds. An open circuit breaker ends evaluation early and discards
    /// what earlier policies decided, including retry attempts they counted.
    #[instrument(skip_all, fields(error_id = %ctx.error_id, module_id = %ctx.module_id()))]
    pub fn apply_policies(
        &self,
        ctx: &ErrorContext,
        mut response: ErrorResponse,
    ) -> Result<ErrorResponse> {
        require_running(&self.lifecycle, COMPONENT)?;

        let candidates: Vec<ErrorPolicy> =
            self.policies.read().iter().filter(|policy| policy.enabled).cloned().collect();
        let view = if candidates.iter().flat_map(|p| &p.conditions).any(|c| c.uses_paths()) {
            ContextView::of(ctx).unwrap_or_else(|err| {
                warn!(error = %err, "Context not representable, custom conditions cannot match");
                ContextView::empty()
            })
        } else {
            ContextView::empty()
        };

        let base = response.clone();
        let retry_before = self.retries.lock().get(&ctx.error_id).cloned();
        let mut applied = Vec::new();
        let mut failures = Vec::new();
        for policy in candidates.iter().filter(|policy| policy.matches(ctx, &view)) {
            let mut working = response.clone();
            match self.execute_policy(policy, ctx, &mut working) {
                Ok(Flow::Continue) => {
                    response = working;
                    applied.push(Value::from(policy.policy_id.as_str()));
                }
                Ok(Flow::Halt) => {
                    // Nothing decided before the halt may reach the caller.
                    debug!(policy_id = %policy.policy_id, "Policy evaluation halted");
                    self.restore_retry_state(&ctx.error_id, retry_before);
                    response = base;
                    response.result = working.result;
                    if let Some(wait) = working.annotations.remove(ANNOTATION_RETRY_AFTER_MS) {
                        response.annotate(ANNOTATION_RETRY_AFTER_MS, wait);
                    }
                    applied = vec![Value::from(policy.policy_id.as_str())];
                    break;
                }
                Err(err) => {
                    warn!(policy_id = %policy.policy_id, error = %err, "Policy failed, skipping");
                    failures.push(json!({"policy_id": policy.policy_id, "error": err.to_string()}));
                }
            }
        }

        debug!(applied = applied.len(), failed = failures.len(), "Policies applied");
        response.annotate(ANNOTATION_POLICIES_APPLIED, applied);
        if !failures.is_empty() {
            response.annotate(ANNOTATION_POLICY_ERRORS, failures);
        }
        Ok(response)
    }

    fn restore_retry_state(&self, error_id: &str, state: Option<RetryState>) {
        let mut retries = self.retries.lock();
        match state {
            Some(state) => {
                retries.insert(error_id.to_string(), state);
            }
            None => {
                retries.remove(error_id);
            }
        }
    }

    fn execute_policy(
        &self,
        policy: &ErrorPolicy,
        ctx: &ErrorContext,
        response: &mut ErrorResponse,
    ) -> Result<Flow> {
        match &policy.kind {
            PolicyKind::Retry(config) => Ok(self.execute_retry(policy, config, ctx, response)),
            PolicyKind::Fallback(config) => Ok(execute_fallback(policy, config, response)),
            PolicyKind::Isolation(config) => {
                Ok(self.execute_isolation(policy, config, ctx, response))
            }
            PolicyKind::Notification(config) => {
                Ok(execute_notification(policy, config, ctx, response))
            }
            PolicyKind::Custom(config) => execute_custom(policy, config, ctx, response),
        }
    }

    fn execute_retry(
        &self,
        policy: &ErrorPolicy,
        config: &RetryPolicyConfig,
        ctx: &ErrorContext,
        response: &mut ErrorResponse,
    ) -> Flow {
        if !config.is_retryable(response.code()) {
            debug!(policy_id = %policy.policy_id, code = ?response.code(), "Response code not retryable");
            return Flow::Continue;
        }

        let mut retries = self.retries.lock();
        let state = retries
            .entry(ctx.error_id.clone())
            .or_insert_with(|| RetryState::new(&config.backoff));
        match state.next_delay() {
            Some(delay) => {
                let attempt = state.attempts();
                let max_retries = state.max_retries();
                drop(retries);

                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                response.actions.push(
                    Action::new(
                        ActionType::Retry,
                        ctx.module_id(),
                        json!({
                            "policy_id": policy.policy_id,
                            "delay_ms": delay_ms,
                            "attempt": attempt,
                            "max_retries": max_retries,
                        }),
                    )
                    .with_priority(policy.priority),
                );
                response.set_result(
                    ResponseStatus::Retry,
                    CODE_RETRY_SCHEDULED,
                    format!("Retry {attempt}/{max_retries} scheduled in {delay_ms}ms"),
                );
                debug!(attempt, delay_ms, "Retry scheduled");
            }
            None => {
                retries.remove(&ctx.error_id);
                drop(retries);
                response.annotate(ANNOTATION_RETRY_EXHAUSTED, true);
                info!(error_id = %ctx.error_id, "Retries exhausted");
            }
        }
        Flow::Continue
    }

    fn execute_isolation(
        &self,
        policy: &ErrorPolicy,
        config: &CircuitBreakerConfig,
        ctx: &ErrorContext,
        response: &mut ErrorResponse,
    ) -> Flow {
        let module_id = ctx.module_id();
        self.breakers.ensure(module_id, config);
        if let Err(err) = self.breakers.check(module_id) {
            warn!(module_id, error = %err, "Circuit breaker open, short-circuiting");
            response.set_result(
                ResponseStatus::Failure,
                CODE_CIRCUIT_BREAKER_OPEN,
                format!("Circuit breaker open for module '{module_id}'"),
            );
            if let Some(wait) = err.retry_after() {
                response.annotate(
                    ANNOTATION_RETRY_AFTER_MS,
                    u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                );
            }
            return Flow::Halt;
        }

        response.actions.push(
            Action::new(
                ActionType::Isolate,
                module_id,
                json!({
                    "policy_id": policy.policy_id,
                    "threshold": config.threshold,
                    "recovery_time_ms": u64::try_from(config.recovery_time.as_millis()).unwrap_or(u64::MAX),
                }),
            )
            .with_priority(policy.priority),
        );
        Flow::Continue
    }

    /// Record one outcome for `module_id`, creating its breaker if needed
    pub fn update_circuit_breaker(
        &self,
        module_id: &str,
        success: bool,
        config: &CircuitBreakerConfig,
    ) -> Result<CircuitState> {
        require_running(&self.lifecycle, COMPONENT)?;
        Ok(self.breakers.record(module_id, success, config))
    }

    /// Whether calls for `module_id` are admitted; untracked modules are
    pub fn circuit_breaker_allows(&self, module_id: &str) -> Result<bool> {
        require_running(&self.lifecycle, COMPONENT)?;
        Ok(self.breakers.allows(module_id))
    }

    /// Account for the final outcome of one execution
    ///
    /// Only modules that already have a breaker are touched. A success also
    /// discards the retry state of `error_id`.
    pub fn record_outcome(&self, module_id: &str, error_id: &str, success: bool) -> Result<()> {
        require_running(&self.lifecycle, COMPONENT)?;
        if let Some(state) = self.breakers.record_existing(module_id, success) {
            debug!(module_id, success, %state, "Circuit breaker updated");
        }
        if success {
            self.retries.lock().remove(error_id);
        }
        Ok(())
    }

    pub fn circuit_breaker_state(&self, module_id: &str) -> Result<Option<CircuitBreakerSnapshot>> {
        require_running(&self.lifecycle, COMPONENT)?;
        Ok(self.breakers.snapshot(module_id))
    }

    /// Close the breaker for `module_id`; returns whether one was tracked
    pub fn reset_circuit_breaker(&self, module_id: &str) -> Result<bool> {
        require_running(&self.lifecycle, COMPONENT)?;
        Ok(self.breakers.reset(module_id))
    }

    pub fn retry_state(&self, error_id: &str) -> Result<Option<RetryState>> {
        require_running(&self.lifecycle, COMPONENT)?;
        Ok(self.retries.lock().get(error_id).cloned())
    }

    /// Forget the retry state of a resolved error
    pub fn resolve_error(&self, error_id: &str) -> Result<bool> {
        require_running(&self.lifecycle, COMPONENT)?;
        Ok(self.retries.lock().remove(error_id).is_some())
    }

    pub fn status_report(&self) -> PolicyEngineStatus {
        let policies = self.policies.read();
        PolicyEngineStatus {
            status: self.lifecycle.get(),
            policy_count: policies.len(),
            enabled_count: policies.iter().filter(|policy| policy.enabled).count(),
            tracked_breakers: self.breakers.len(),
            open_breakers: self.breakers.open_count(),
            retry_states: self.retries.lock().len(),
        }
    }
}

fn execute_fallback(
    policy: &ErrorPolicy,
    config: &FallbackConfig,
    response: &mut ErrorResponse,
) -> Flow {
    if !config.enabled {
        return Flow::Continue;
    }
    response.actions.push(
        Action::new(
            ActionType::Fallback,
            "fallback",
            json!({
                "policy_id": policy.policy_id,
                "response": config.response,
                "timeout_ms": u64::try_from(config.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        )
        .with_priority(policy.priority),
    );
    response.set_result(ResponseStatus::Fallback, CODE_FALLBACK_ACTIVATED, "Fallback activated");
    response.data = config.response.clone();
    Flow::Continue
}

fn execute_notification(
    policy: &ErrorPolicy,
    config: &NotificationConfig,
    ctx: &ErrorContext,
    response: &mut ErrorResponse,
) -> Flow {
    let severity = ctx.classification.severity;
    if !config.severities.contains(&severity) {
        return Flow::Continue;
    }
    let target = if config.channels.is_empty() {
        DEFAULT_NOTIFICATION_CHANNEL.to_string()
    } else {
        config.channels.join(",")
    };
    response.actions.push(
        Action::new(
            ActionType::Notify,
            target,
            json!({
                "policy_id": policy.policy_id,
                "severity": severity,
                "channels": config.channels,
                "message": ctx.message,
                "module_id": ctx.module_id(),
            }),
        )
        .with_priority(policy.priority),
    );
    Flow::Continue
}

fn execute_custom(
    policy: &ErrorPolicy,
    config: &Value,
    ctx: &ErrorContext,
    response: &mut ErrorResponse,
) -> Result<Flow> {
    let context = serde_json::to_value(ctx)
        .map_err(|err| FaultlineError::Internal(format!("context serialization: {err}")))?;
    response.actions.push(
        Action::new(
            ActionType::Custom,
            policy.policy_id.as_str(),
            json!({"policy_id": policy.policy_id, "config": config, "context": context}),
        )
        .with_priority(policy.priority),
    );
    Ok(Flow::Continue)
}

#[async_trait]
impl AsyncManager for PolicyEngine {
    type Error = FaultlineError;

    async fn initialize(&self) -> Result<()> {
        if !self.lifecycle.begin_initialize() {
            return Ok(());
        }
        self.lifecycle.set(ManagerStatus::Running);
        for policy in default_policies(&self.config.retry) {
            if let Err(err) = self.register_policy(policy) {
                self.lifecycle.set(ManagerStatus::Error);
                return Err(err);
            }
        }
        info!(policies = self.policies.read().len(), "Policy engine initialized");
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        if self.lifecycle.begin_shutdown() {
            self.breakers.clear();
            self.retries.lock().clear();
            self.lifecycle.set(ManagerStatus::Shutdown);
            info!("Policy engine shut down");
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<ManagerHealth> {
        if !self.lifecycle.is_running() {
            return Ok(ManagerHealth::unhealthy(format!(
                "policy engine is {}",
                self.lifecycle.get()
            )));
        }
        let open = self.breakers.open_count();
        let breakers = if open == 0 {
            ComponentHealth::healthy("circuit_breakers")
        } else {
            ComponentHealth::unhealthy("circuit_breakers", format!("{open} open"))
        };
        Ok(ManagerHealth::healthy().with_component(breakers))
    }

    fn status(&self) -> ManagerStatus {
        self.lifecycle.get()
    }

    fn name(&self) -> &'static str {
        COMPONENT
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use faultline_common::resilience::{MockClock, RetryConfig};
    use faultline_domain::constants::{
        CODE_TIMEOUT, DEFAULT_CRITICAL_NOTIFICATION_POLICY, DEFAULT_TECHNICAL_RETRY_POLICY,
    };
    use faultline_domain::{
        Classification, ErrorType, ModuleSource, RouteCondition, Severity,
    };

    use super::*;

    async fn engine() -> PolicyEngine {
        let engine = PolicyEngine::default();
        engine.initialize().await.unwrap();
        // Start from a clean slate; defaults are covered separately.
        engine.unregister_policy(DEFAULT_CRITICAL_NOTIFICATION_POLICY).unwrap();
        engine.unregister_policy(DEFAULT_TECHNICAL_RETRY_POLICY).unwrap();
        engine
    }

    fn ctx(error_type: ErrorType, severity: Severity) -> ErrorContext {
        ErrorContext::new(
            ModuleSource::new("provider", "Provider", "1.0.0"),
            Classification::new(error_type, severity),
            "upstream failed",
        )
    }

    fn base(ctx: &ErrorContext, code: &str) -> ErrorResponse {
        ErrorResponse::failure(&ctx.error_id, code, "handler gave up")
    }

    fn retry_policy(max_retries: u32) -> ErrorPolicy {
        ErrorPolicy::new(
            "retry",
            "Retry",
            PolicyKind::Retry(RetryPolicyConfig {
                backoff: RetryConfig {
                    max_retries,
                    initial_delay: Duration::from_millis(1000),
                    backoff_multiplier: 2.0,
                    max_delay: Duration::from_millis(30_000),
                },
                ..RetryPolicyConfig::default()
            }),
        )
    }

    #[tokio::test]
    async fn test_defaults_registered_on_initialize() {
        let engine = PolicyEngine::default();
        assert!(matches!(
            engine.list_policies().unwrap_err(),
            FaultlineError::NotInitialized { .. }
        ));

        engine.initialize().await.unwrap();
        let ids: Vec<_> =
            engine.list_policies().unwrap().into_iter().map(|p| p.policy_id).collect();
        assert_eq!(ids, [DEFAULT_CRITICAL_NOTIFICATION_POLICY, DEFAULT_TECHNICAL_RETRY_POLICY]);
    }

    #[tokio::test]
    async fn test_invalid_policy_rejected() {
        let engine = engine().await;
        let err = engine.register_policy(retry_policy(1).with_priority(-1)).unwrap_err();
        assert!(matches!(err, FaultlineError::InvalidPolicy { .. }));
        assert!(engine.list_policies().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_schedules_until_exhausted() {
        let engine = engine().await;
        engine.register_policy(retry_policy(2)).unwrap();
        let ctx = ctx(ErrorType::Network, Severity::Medium);

        let first = engine.apply_policies(&ctx, base(&ctx, CODE_TIMEOUT)).unwrap();
        assert_eq!(first.status(), ResponseStatus::Retry);
        assert_eq!(first.code(), Some(CODE_RETRY_SCHEDULED));
        assert_eq!(first.actions[0].payload["delay_ms"], 1000);

        let second = engine.apply_policies(&ctx, base(&ctx, CODE_TIMEOUT)).unwrap();
        assert_eq!(second.actions[0].payload["delay_ms"], 2000);

        let third = engine.apply_policies(&ctx, base(&ctx, CODE_TIMEOUT)).unwrap();
        assert!(third.actions.is_empty());
        assert_eq!(third.status(), ResponseStatus::Failure);
        assert_eq!(third.annotation(ANNOTATION_RETRY_EXHAUSTED), Some(&Value::Bool(true)));
        assert!(engine.retry_state(&ctx.error_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_retryable_code_creates_no_state() {
        let engine = engine().await;
        engine.register_policy(retry_policy(2)).unwrap();
        let ctx = ctx(ErrorType::Business, Severity::Low);

        let response = engine.apply_policies(&ctx, base(&ctx, "BAD_INPUT")).unwrap();
        assert!(response.actions.is_empty());
        assert!(engine.retry_state(&ctx.error_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fallback_copies_substitute() {
        let engine = engine().await;
        let substitute = json!({"choices": [{"text": "cached"}]});
        engine
            .register_policy(ErrorPolicy::new(
                "fallback",
                "Cached completion",
                PolicyKind::Fallback(FallbackConfig {
                    response: substitute.clone(),
                    ..FallbackConfig::default()
                }),
            ))
            .unwrap();
        let ctx = ctx(ErrorType::Resource, Severity::High);

        let response = engine.apply_policies(&ctx, base(&ctx, "QUOTA")).unwrap();
        assert_eq!(response.status(), ResponseStatus::Fallback);
        assert_eq!(response.code(), Some(CODE_FALLBACK_ACTIVATED));
        assert_eq!(response.data, substitute);
        assert_eq!(response.actions[0].action_type, ActionType::Fallback);
        assert_eq!(response.actions[0].payload["timeout_ms"], 5000);
    }

    #[tokio::test]
    async fn test_open_breaker_halts_evaluation() {
        let clock = MockClock::new();
        let engine = PolicyEngine::with_clock(&FaultlineConfig::default(), Arc::new(clock.clone()));
        engine.initialize().await.unwrap();
        let breaker = CircuitBreakerConfig::new(2, Duration::from_secs(10));
        engine
            .register_policy(
                ErrorPolicy::new("isolate", "Isolate", PolicyKind::Isolation(breaker))
                    .with_priority(200),
            )
            .unwrap();
        let ctx = ctx(ErrorType::Technical, Severity::Critical);

        let closed = engine.apply_policies(&ctx, base(&ctx, CODE_TIMEOUT)).unwrap();
        assert_eq!(closed.actions[0].action_type, ActionType::Isolate);
        assert!(closed.actions.len() > 1);

        engine.update_circuit_breaker("provider", false, &breaker).unwrap();
        engine.update_circuit_breaker("provider", false, &breaker).unwrap();
        assert!(!engine.circuit_breaker_allows("provider").unwrap());

        let open = engine.apply_policies(&ctx, base(&ctx, CODE_TIMEOUT)).unwrap();
        assert_eq!(open.code(), Some(CODE_CIRCUIT_BREAKER_OPEN));
        assert!(open.actions.is_empty());
        assert_eq!(open.annotation(ANNOTATION_POLICIES_APPLIED), Some(&json!(["isolate"])));
        assert_eq!(open.annotation(ANNOTATION_RETRY_AFTER_MS), Some(&json!(10_000)));

        clock.advance(Duration::from_secs(10));
        assert!(engine.circuit_breaker_allows("provider").unwrap());
    }

    #[tokio::test]
    async fn test_open_breaker_discards_higher_priority_retry() {
        let engine = engine().await;
        let breaker = CircuitBreakerConfig::new(1, Duration::from_secs(60));
        engine.register_policy(retry_policy(3).with_priority(50)).unwrap();
        engine
            .register_policy(
                ErrorPolicy::new("isolate", "Isolate", PolicyKind::Isolation(breaker))
                    .with_priority(10),
            )
            .unwrap();
        let ctx = ctx(ErrorType::Technical, Severity::Medium);

        let first = engine.apply_policies(&ctx, base(&ctx, CODE_TIMEOUT)).unwrap();
        assert_eq!(first.code(), Some(CODE_RETRY_SCHEDULED));
        engine.record_outcome("provider", &ctx.error_id, false).unwrap();
        assert!(!engine.circuit_breaker_allows("provider").unwrap());

        let open = engine.apply_policies(&ctx, base(&ctx, CODE_TIMEOUT)).unwrap();
        assert_eq!(open.code(), Some(CODE_CIRCUIT_BREAKER_OPEN));
        assert!(open.actions.iter().all(|a| a.action_type != ActionType::Retry));
        assert_eq!(open.annotation(ANNOTATION_POLICIES_APPLIED), Some(&json!(["isolate"])));
        assert_eq!(engine.retry_state(&ctx.error_id).unwrap().map(|s| s.attempts()), Some(1));
    }

    #[tokio::test]
    async fn test_notification_respects_severity() {
        let engine = engine().await;
        engine
            .register_policy(ErrorPolicy::new(
                "page",
                "Page on-call",
                PolicyKind::Notification(NotificationConfig {
                    severities: vec![Severity::High, Severity::Critical],
                    channels: vec!["pager".into(), "slack".into()],
                }),
            ))
            .unwrap();

        let low = ctx(ErrorType::Technical, Severity::Low);
        assert!(engine.apply_policies(&low, base(&low, "X")).unwrap().actions.is_empty());

        let high = ctx(ErrorType::Technical, Severity::High);
        let response = engine.apply_policies(&high, base(&high, "X")).unwrap();
        assert_eq!(response.actions[0].action_type, ActionType::Notify);
        assert_eq!(response.actions[0].target, "pager,slack");
        // Notification does not change the result.
        assert_eq!(response.code(), Some("X"));
    }

    #[tokio::test]
    async fn test_custom_policy_carries_context() {
        let engine = engine().await;
        engine
            .register_policy(ErrorPolicy::new(
                "switch-provider",
                "Switch provider",
                PolicyKind::Custom(json!({"to": "secondary"})),
            ))
            .unwrap();
        let ctx = ctx(ErrorType::Dependency, Severity::Medium);

        let response = engine.apply_policies(&ctx, base(&ctx, "X")).unwrap();
        let action = &response.actions[0];
        assert_eq!(action.action_type, ActionType::Custom);
        assert_eq!(action.payload["config"]["to"], "secondary");
        assert_eq!(action.payload["context"]["error_id"], json!(ctx.error_id));
    }

    #[tokio::test]
    async fn test_priority_order_and_disabled_policies() {
        let engine = engine().await;
        let notify = |id: &str| {
            ErrorPolicy::new(
                id,
                id,
                PolicyKind::Notification(NotificationConfig {
                    severities: vec![Severity::Medium],
                    channels: vec![id.to_string()],
                }),
            )
        };
        engine.register_policy(notify("low").with_priority(10)).unwrap();
        engine.register_policy(notify("high").with_priority(90)).unwrap();
        engine.register_policy(notify("off").with_priority(95).disabled()).unwrap();

        let ctx = ctx(ErrorType::Technical, Severity::Medium);
        let response = engine.apply_policies(&ctx, base(&ctx, "X")).unwrap();
        let targets: Vec<_> = response.actions.iter().map(|a| a.target.as_str()).collect();
        assert_eq!(targets, ["high", "low"]);
    }

    #[tokio::test]
    async fn test_conditions_filter_policies() {
        let engine = engine().await;
        engine
            .register_policy(
                retry_policy(3)
                    .with_condition(RouteCondition::any().with_field("data.region", "eu")),
            )
            .unwrap();

        let us = ctx(ErrorType::Network, Severity::Low).with_data(json!({"region": "us"}));
        assert!(engine.apply_policies(&us, base(&us, CODE_TIMEOUT)).unwrap().actions.is_empty());

        let eu = ctx(ErrorType::Network, Severity::Low).with_data(json!({"region": "eu"}));
        assert_eq!(engine.apply_policies(&eu, base(&eu, CODE_TIMEOUT)).unwrap().actions.len(), 1);
    }

    #[tokio::test]
    async fn test_success_outcome_discards_retry_state() {
        let engine = engine().await;
        engine.register_policy(retry_policy(3)).unwrap();
        let ctx = ctx(ErrorType::Network, Severity::Low);

        engine.apply_policies(&ctx, base(&ctx, CODE_TIMEOUT)).unwrap();
        assert_eq!(engine.retry_state(&ctx.error_id).unwrap().map(|s| s.attempts()), Some(1));

        engine.record_outcome("provider", &ctx.error_id, true).unwrap();
        assert!(engine.retry_state(&ctx.error_id).unwrap().is_none());
        // No isolation policy ran, so no breaker was created.
        assert!(engine.circuit_breaker_state("provider").unwrap().is_none());
    }
}
