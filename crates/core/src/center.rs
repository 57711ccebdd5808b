//! Composition root
//!
//! [`ResilienceCenter`] owns one registry, policy engine, router and
//! executor. It initializes them in dependency order, shuts them down in
//! reverse, and keeps them consistent when modules come and go.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use faultline_common::lifecycle::{
    AsyncManager, ComponentHealth, LifecycleState, ManagerHealth, ManagerStatus,
};
use faultline_common::resilience::{Clock, SystemClock};
use faultline_domain::{
    ErrorContext, ErrorResponse, FaultlineConfig, FaultlineError, ModuleHealth, Result,
};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::executor::{ExecutionMetrics, ExecutorStatus, ResponseExecutor};
use crate::handler_ports::{DefaultHandler, SharedHandler};
use crate::notification_ports::NotificationSink;
use crate::policy::{PolicyEngine, PolicyEngineStatus};
use crate::registry::{ModuleRegistration, ModuleRegistry, RegistryStatus};
use crate::router::{ResponseRouter, RouterStatus};
use crate::utils::require_running;

const COMPONENT: &str = "ResilienceCenter";

/// Status of every component in one report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CenterStatus {
    pub status: ManagerStatus,
    pub registry: RegistryStatus,
    pub engine: PolicyEngineStatus,
    pub router: RouterStatus,
    pub executor: ExecutorStatus,
    pub metrics: ExecutionMetrics,
}

/// Builder for [`ResilienceCenter`] with fluent API
#[derive(Default)]
pub struct ResilienceCenterBuilder {
    config: FaultlineConfig,
    default_handler: Option<SharedHandler>,
    notification_sink: Option<Arc<dyn NotificationSink>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ResilienceCenterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: FaultlineConfig) -> Self {
        self.config = config;
        self
    }

    /// Handler for failures no rule or module handler claims
    pub fn default_handler(mut self, handler: SharedHandler) -> Self {
        self.default_handler = Some(handler);
        self
    }

    pub fn notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notification_sink = Some(sink);
        self
    }

    /// Clock driving circuit-breaker recovery
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration and wire the components
    pub fn build(self) -> Result<ResilienceCenter> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let default_handler = self.default_handler.unwrap_or_else(|| Arc::new(DefaultHandler));

        let registry = Arc::new(ModuleRegistry::new(self.config.registry.clone()));
        let engine = Arc::new(PolicyEngine::with_clock(&self.config, clock));
        let router = Arc::new(ResponseRouter::new(self.config.router.clone(), default_handler));
        let executor = ResponseExecutor::new(
            &self.config.executor,
            Arc::clone(&router),
            Arc::clone(&engine),
            Arc::clone(&registry),
        );
        if let Some(sink) = self.notification_sink {
            executor.set_notification_sink(sink);
        }

        Ok(ResilienceCenter {
            config: self.config,
            registry,
            engine,
            router,
            executor,
            lifecycle: LifecycleState::new(),
        })
    }
}

/// Owns the four components and keeps them consistent
pub struct ResilienceCenter {
    config: FaultlineConfig,
    registry: Arc<ModuleRegistry>,
    engine: Arc<PolicyEngine>,
    router: Arc<ResponseRouter>,
    executor: ResponseExecutor,
    lifecycle: LifecycleState,
}

impl ResilienceCenter {
    /// Center with `config` and the default handler
    pub fn new(config: FaultlineConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> ResilienceCenterBuilder {
        ResilienceCenterBuilder::new()
    }

    /// Register a module with the registry, the router and the engine
    ///
    /// Everything is validated before anything changes. Policy ids already
    /// held by the defaults or another module are rejected. Policies of an
    /// earlier registration under the same id that the new one no longer
    /// declares are removed.
    #[instrument(skip(self, registration), fields(module_id = %registration.module_id))]
    pub async fn register_module(&self, registration: ModuleRegistration) -> Result<()> {
        require_running(&self.lifecycle, COMPONENT)?;
        registration.validate()?;
        let previous = self.registry.get(&registration.module_id)?;
        for policy in &registration.error_policies {
            policy.validate()?;
            self.ensure_policy_id_free(&policy.policy_id, previous.as_ref())?;
        }
        self.router.validate_module(&registration)?;

        self.registry.register(registration.clone())?;
        self.router.register_module(&registration)?;

        if let Some(previous) = previous {
            for stale in previous.error_policies.iter().filter(|old| {
                !registration.error_policies.iter().any(|new| new.policy_id == old.policy_id)
            }) {
                self.remove_policy(&stale.policy_id);
            }
        }
        for policy in &registration.error_policies {
            self.engine.register_policy(policy.clone())?;
        }
        info!(
            policies = registration.error_policies.len(),
            dependencies = registration.dependencies.len(),
            "Module registered"
        );
        Ok(())
    }

    /// Remove a module from all components
    #[instrument(skip(self))]
    pub async fn unregister_module(&self, module_id: &str) -> Result<ModuleRegistration> {
        require_running(&self.lifecycle, COMPONENT)?;
        let registration = self.registry.unregister(module_id)?;
        self.router.unregister_module(module_id)?;
        for policy in &registration.error_policies {
            self.remove_policy(&policy.policy_id);
        }
        info!("Module unregistered");
        Ok(registration)
    }

    /// A module may only reuse policy ids it registered itself
    fn ensure_policy_id_free(
        &self,
        policy_id: &str,
        previous: Option<&ModuleRegistration>,
    ) -> Result<()> {
        let owned = previous
            .is_some_and(|prev| prev.error_policies.iter().any(|p| p.policy_id == policy_id));
        if !owned && self.engine.get_policy(policy_id)?.is_some() {
            return Err(FaultlineError::invalid_policy(policy_id, "policy id already in use"));
        }
        Ok(())
    }

    fn remove_policy(&self, policy_id: &str) {
        match self.engine.unregister_policy(policy_id) {
            Ok(_) | Err(FaultlineError::PolicyNotFound(_)) => {}
            Err(err) => warn!(policy_id, error = %err, "Module policy not removed"),
        }
    }

    /// Route and execute one failure, waiting for the result
    pub async fn handle(&self, ctx: &ErrorContext) -> Result<ErrorResponse> {
        require_running(&self.lifecycle, COMPONENT)?;
        self.executor.handle(ctx).await
    }

    /// Route and schedule one failure; the result goes to its callback
    pub fn handle_async(&self, ctx: ErrorContext) -> Result<ErrorResponse> {
        require_running(&self.lifecycle, COMPONENT)?;
        self.executor.handle_async(ctx)
    }

    /// Route and execute many failures
    pub async fn handle_batch(&self, contexts: Vec<ErrorContext>) -> Result<Vec<ErrorResponse>> {
        require_running(&self.lifecycle, COMPONENT)?;
        self.executor.handle_batch(contexts).await
    }

    /// Health snapshot of every registered module
    pub fn module_health(&self) -> Result<BTreeMap<String, ModuleHealth>> {
        self.registry.all_health()
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<PolicyEngine> {
        &self.engine
    }

    pub fn router(&self) -> &Arc<ResponseRouter> {
        &self.router
    }

    pub fn executor(&self) -> &ResponseExecutor {
        &self.executor
    }

    pub fn config(&self) -> &FaultlineConfig {
        &self.config
    }

    pub fn status_report(&self) -> CenterStatus {
        CenterStatus {
            status: self.lifecycle.get(),
            registry: self.registry.status_report(),
            engine: self.engine.status_report(),
            router: self.router.status_report(),
            executor: self.executor.status_report(),
            metrics: self.executor.metrics(),
        }
    }

    async fn initialize_components(&self) -> Result<()> {
        self.registry.initialize().await?;
        self.engine.initialize().await?;
        self.router.initialize().await?;
        self.executor.initialize().await
    }
}

/// Fold one component's health check into a component entry
fn component_health(name: &str, health: Result<ManagerHealth>) -> ComponentHealth {
    match health {
        Ok(health) if health.is_healthy => ComponentHealth::healthy(name),
        Ok(health) => ComponentHealth::unhealthy(
            name,
            health.message.unwrap_or_else(|| {
                health
                    .components
                    .iter()
                    .filter(|component| !component.is_healthy)
                    .map(|component| component.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            }),
        ),
        Err(err) => ComponentHealth::unhealthy(name, err.to_string()),
    }
}

#[async_trait]
impl AsyncManager for ResilienceCenter {
    type Error = FaultlineError;

    /// Initialize registry, engine, router and executor, in that order
    async fn initialize(&self) -> Result<()> {
        if !self.lifecycle.begin_initialize() {
            return Ok(());
        }
        if let Err(err) = self.initialize_components().await {
            error!(error = %err, "Resilience center failed to initialize");
            self.lifecycle.set(ManagerStatus::Error);
            return Err(err);
        }
        self.lifecycle.set(ManagerStatus::Running);
        info!("Resilience center initialized");
        Ok(())
    }

    /// Shut down in reverse order; the first error is reported after all
    /// components were asked to stop
    async fn shutdown(&self) -> Result<()> {
        if !self.lifecycle.begin_shutdown() {
            return Ok(());
        }
        let results = [
            self.executor.shutdown().await,
            self.router.shutdown().await,
            self.engine.shutdown().await,
            self.registry.shutdown().await,
        ];
        self.lifecycle.set(ManagerStatus::Shutdown);
        info!("Resilience center shut down");
        results.into_iter().collect::<Result<Vec<()>>>().map(|_| ())
    }

    async fn health_check(&self) -> Result<ManagerHealth> {
        if !self.lifecycle.is_running() {
            return Ok(ManagerHealth::unhealthy(format!(
                "resilience center is {}",
                self.lifecycle.get()
            )));
        }
        Ok(ManagerHealth::healthy()
            .with_component(component_health(
                self.registry.name(),
                self.registry.health_check().await,
            ))
            .with_component(component_health(self.engine.name(), self.engine.health_check().await))
            .with_component(component_health(self.router.name(), self.router.health_check().await))
            .with_component(component_health(
                self.executor.name(),
                self.executor.health_check().await,
            )))
    }

    fn status(&self) -> ManagerStatus {
        self.lifecycle.get()
    }

    fn name(&self) -> &'static str {
        COMPONENT
    }
}
