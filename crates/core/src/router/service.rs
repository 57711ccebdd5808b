//! Response router service
//!
//! Resolution order for one failure:
//! 1. the first enabled rule (highest priority first) whose condition matches
//! 2. the handler registered for the failing module
//! 3. the default handler
//!
//! Routing is total: a context that cannot be evaluated goes to the default
//! handler.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use faultline_common::lifecycle::{AsyncManager, LifecycleState, ManagerHealth, ManagerStatus};
use faultline_domain::constants::{module_custom_rule_id, module_rule_id};
use faultline_domain::{
    ContextView, ErrorContext, FaultlineError, Result, RouteCondition, RouterConfig,
};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::types::RoutingRule;
use crate::handler_ports::{DefaultHandler, SharedHandler};
use crate::registry::ModuleRegistration;
use crate::utils::require_running;

const COMPONENT: &str = "ResponseRouter";

/// Router status for the observability layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouterStatus {
    pub status: ManagerStatus,
    pub rule_count: usize,
    pub enabled_rules: usize,
    pub module_handlers: usize,
}

/// Selects the handler responsible for a failure
pub struct ResponseRouter {
    /// Sorted by priority, highest first; ties keep registration order
    rules: RwLock<Vec<RoutingRule>>,
    module_handlers: RwLock<HashMap<String, SharedHandler>>,
    default_handler: SharedHandler,
    config: RouterConfig,
    lifecycle: LifecycleState,
}

impl Default for ResponseRouter {
    fn default() -> Self {
        Self::new(RouterConfig::default(), Arc::new(DefaultHandler))
    }
}

impl ResponseRouter {
    pub fn new(config: RouterConfig, default_handler: SharedHandler) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            module_handlers: RwLock::new(HashMap::new()),
            default_handler,
            config,
            lifecycle: LifecycleState::new(),
        }
    }

    /// Add or replace a rule
    #[instrument(skip(self, rule), fields(rule_id = %rule.rule_id, priority = rule.priority))]
    pub fn register_route(&self, rule: RoutingRule) -> Result<()> {
        require_running(&self.lifecycle, COMPONENT)?;
        rule.validate()?;

        let mut rules = self.rules.write();
        insert_sorted(&mut rules, rule);
        debug!("Route registered");
        Ok(())
    }

    pub fn unregister_route(&self, rule_id: &str) -> Result<RoutingRule> {
        require_running(&self.lifecycle, COMPONENT)?;
        let mut rules = self.rules.write();
        let index = rules
            .iter()
            .position(|rule| rule.rule_id == rule_id)
            .ok_or_else(|| FaultlineError::RouteNotFound(rule_id.to_string()))?;
        debug!(rule_id, "Route unregistered");
        Ok(rules.remove(index))
    }

    /// Derive the rules and handler binding of a module
    ///
    /// Rules from an earlier registration of the same module are replaced.
    /// Custom rules need the module's handler and are skipped without one.
    #[instrument(skip(self, registration), fields(module_id = %registration.module_id))]
    pub fn register_module(&self, registration: &ModuleRegistration) -> Result<()> {
        require_running(&self.lifecycle, COMPONENT)?;
        let module_id = registration.module_id.as_str();
        let derived = self.derive_rules(registration)?;

        let mut rules = self.rules.write();
        let mut handlers = self.module_handlers.write();
        rules.retain(|rule| rule.owner.as_deref() != Some(module_id));
        handlers.remove(module_id);

        let Some(handler) = &registration.handler else {
            if !registration.custom_rules.is_empty() {
                warn!(
                    module_id,
                    rules = registration.custom_rules.len(),
                    "Module has custom rules but no handler, skipping them"
                );
            }
            return Ok(());
        };
        handlers.insert(module_id.to_string(), Arc::clone(handler));
        let count = derived.len();
        for rule in derived {
            insert_sorted(&mut rules, rule);
        }
        info!(rules = count, "Module routes registered");
        Ok(())
    }

    /// Check that the rules of `registration` can be derived
    pub(crate) fn validate_module(&self, registration: &ModuleRegistration) -> Result<()> {
        self.derive_rules(registration).map(|_| ())
    }

    /// The auto rule plus one rule per custom rule, all bound to the module
    /// handler; empty when the module has no handler
    fn derive_rules(&self, registration: &ModuleRegistration) -> Result<Vec<RoutingRule>> {
        let Some(handler) = &registration.handler else {
            return Ok(Vec::new());
        };
        let module_id = registration.module_id.as_str();
        let auto = RoutingRule::new(
            module_rule_id(module_id),
            registration.name.as_str(),
            RouteCondition::for_modules([module_id]),
            Arc::clone(handler),
        )
        .with_priority(self.config.module_rule_priority)
        .owned_by(module_id);

        let mut derived = vec![auto];
        for (index, custom) in registration.custom_rules.iter().enumerate() {
            let mut rule = RoutingRule::new(
                custom.rule_id.clone().unwrap_or_else(|| module_custom_rule_id(module_id, index)),
                custom.name.as_str(),
                custom.condition.clone(),
                Arc::clone(handler),
            )
            .with_priority(custom.priority.unwrap_or(self.config.module_rule_priority))
            .owned_by(module_id);
            rule.enabled = custom.enabled;
            rule.validate()?;
            derived.push(rule);
        }
        Ok(derived)
    }

    /// Drop the rules and handler derived from a module
    pub fn unregister_module(&self, module_id: &str) -> Result<()> {
        require_running(&self.lifecycle, COMPONENT)?;
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|rule| rule.owner.as_deref() != Some(module_id));
        let removed_handler = self.module_handlers.write().remove(module_id).is_some();
        debug!(module_id, rules = before - rules.len(), removed_handler, "Module routes removed");
        Ok(())
    }

    /// Handler responsible for `ctx`
    #[instrument(skip_all, fields(error_id = %ctx.error_id, module_id = %ctx.module_id()))]
    pub fn route(&self, ctx: &ErrorContext) -> Result<SharedHandler> {
        require_running(&self.lifecycle, COMPONENT)?;

        let rules = self.rules.read();
        let view = if rules.iter().any(|rule| rule.enabled && rule.condition.uses_paths()) {
            match ContextView::of(ctx) {
                Ok(view) => view,
                Err(err) => {
                    warn!(error = %err, "Context not representable, using default handler");
                    return Ok(Arc::clone(&self.default_handler));
                }
            }
        } else {
            ContextView::empty()
        };

        if let Some(rule) = rules.iter().find(|rule| rule.matches(ctx, &view)) {
            debug!(rule_id = %rule.rule_id, handler = rule.handler.name(), "Routed by rule");
            return Ok(Arc::clone(&rule.handler));
        }
        drop(rules);

        if let Some(handler) = self.module_handlers.read().get(ctx.module_id()) {
            debug!(handler = handler.name(), "Routed to module handler");
            return Ok(Arc::clone(handler));
        }
        debug!("Routed to default handler");
        Ok(Arc::clone(&self.default_handler))
    }

    /// Registered rules, highest priority first
    pub fn rules(&self) -> Vec<RoutingRule> {
        self.rules.read().clone()
    }

    pub fn default_handler(&self) -> SharedHandler {
        Arc::clone(&self.default_handler)
    }

    pub fn status_report(&self) -> RouterStatus {
        let rules = self.rules.read();
        RouterStatus {
            status: self.lifecycle.get(),
            rule_count: rules.len(),
            enabled_rules: rules.iter().filter(|rule| rule.enabled).count(),
            module_handlers: self.module_handlers.read().len(),
        }
    }
}

/// Replace any rule with the same id, then insert after equal priorities
fn insert_sorted(rules: &mut Vec<RoutingRule>, rule: RoutingRule) {
    rules.retain(|existing| existing.rule_id != rule.rule_id);
    let position = rules.partition_point(|existing| existing.priority >= rule.priority);
    rules.insert(position, rule);
}

#[async_trait]
impl AsyncManager for ResponseRouter {
    type Error = FaultlineError;

    async fn initialize(&self) -> Result<()> {
        if self.lifecycle.begin_initialize() {
            self.lifecycle.set(ManagerStatus::Running);
            info!(default_handler = self.default_handler.name(), "Response router initialized");
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        if self.lifecycle.begin_shutdown() {
            self.lifecycle.set(ManagerStatus::Shutdown);
            info!("Response router shut down");
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<ManagerHealth> {
        if self.lifecycle.is_running() {
            Ok(ManagerHealth::healthy())
        } else {
            Ok(ManagerHealth::unhealthy(format!("router is {}", self.lifecycle.get())))
        }
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
    use faultline_domain::{
        Classification, ErrorResponse, ErrorType, ModuleRule, ModuleSource, Severity,
    };
    use serde_json::json;

    use super::*;
    use crate::handler_ports::handler_fn;

    fn named(name: &'static str) -> SharedHandler {
        handler_fn(name, |ctx| async move { Ok(ErrorResponse::success(&ctx.error_id, "ok")) })
    }

    fn ctx(module: &str) -> ErrorContext {
        ErrorContext::new(
            ModuleSource::new(module, module, "1.0.0"),
            Classification::new(ErrorType::Technical, Severity::High),
            "failed",
        )
    }

    async fn router() -> ResponseRouter {
        let router = ResponseRouter::new(RouterConfig::default(), named("default"));
        router.initialize().await.unwrap();
        router
    }

    #[tokio::test]
    async fn test_empty_router_uses_default() {
        let router = router().await;
        assert_eq!(router.route(&ctx("anything")).unwrap().name(), "default");
    }

    #[tokio::test]
    async fn test_route_requires_initialize() {
        let router = ResponseRouter::default();
        assert!(matches!(
            router.route(&ctx("a")).err(),
            Some(FaultlineError::NotInitialized { .. })
        ));
    }

    #[tokio::test]
    async fn test_rule_priority_over_module_rule() {
        let router = router().await;
        router
            .register_module(
                &ModuleRegistration::new("provider", "Provider", "1.0.0")
                    .with_handler(named("module")),
            )
            .unwrap();
        assert_eq!(router.route(&ctx("provider")).unwrap().name(), "module");

        router
            .register_route(
                RoutingRule::new("low", "Low", RouteCondition::any(), named("low")).with_priority(10),
            )
            .unwrap();
        assert_eq!(router.route(&ctx("provider")).unwrap().name(), "module");
        assert_eq!(router.route(&ctx("other")).unwrap().name(), "low");

        router
            .register_route(
                RoutingRule::new("high", "High", RouteCondition::any(), named("high"))
                    .with_priority(90),
            )
            .unwrap();
        assert_eq!(router.route(&ctx("provider")).unwrap().name(), "high");
    }

    #[tokio::test]
    async fn test_disabled_rule_is_skipped() {
        let router = router().await;
        router
            .register_route(
                RoutingRule::new("off", "Off", RouteCondition::any(), named("off"))
                    .with_priority(100)
                    .disabled(),
            )
            .unwrap();
        assert_eq!(router.route(&ctx("a")).unwrap().name(), "default");
    }

    #[tokio::test]
    async fn test_custom_rules_follow_module() {
        let router = router().await;
        let registration = ModuleRegistration::new("provider", "Provider", "1.0.0")
            .with_handler(named("module"))
            .with_rule(
                ModuleRule::new("EU traffic", RouteCondition::any().with_field("data.region", "eu"))
                    .with_priority(80),
            );
        router.register_module(&registration).unwrap();
        assert_eq!(router.rules().len(), 2);
        assert_eq!(router.rules()[0].rule_id, module_custom_rule_id("provider", 0));

        let eu = ctx("transformer").with_data(json!({"region": "eu"}));
        assert_eq!(router.route(&eu).unwrap().name(), "module");

        router.unregister_module("provider").unwrap();
        assert!(router.rules().is_empty());
        assert_eq!(router.route(&eu).unwrap().name(), "default");
        assert_eq!(router.route(&ctx("provider")).unwrap().name(), "default");
    }

    #[tokio::test]
    async fn test_module_without_handler_derives_nothing() {
        let router = router().await;
        let registration = ModuleRegistration::new("m", "M", "1.0.0")
            .with_rule(ModuleRule::new("any", RouteCondition::any()));
        router.register_module(&registration).unwrap();
        assert_eq!(router.status_report().rule_count, 0);
    }

    #[tokio::test]
    async fn test_unregister_unknown_route() {
        let router = router().await;
        assert_eq!(
            router.unregister_route("missing").unwrap_err(),
            FaultlineError::RouteNotFound("missing".into())
        );
    }
}
