//! Routing rule type

use std::fmt;

use faultline_domain::{ContextView, ErrorContext, FaultlineError, Result, RouteCondition};

use crate::handler_ports::SharedHandler;

/// Sends failures matching `condition` to `handler`
#[derive(Clone)]
pub struct RoutingRule {
    pub rule_id: String,
    pub name: String,
    pub priority: i32,
    pub condition: RouteCondition,
    pub handler: SharedHandler,
    pub enabled: bool,
    /// Module the rule was derived from; removed with that module
    pub owner: Option<String>,
}

impl fmt::Debug for RoutingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingRule")
            .field("rule_id", &self.rule_id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("condition", &self.condition)
            .field("handler", &self.handler.name())
            .field("enabled", &self.enabled)
            .field("owner", &self.owner)
            .finish()
    }
}

impl RoutingRule {
    /// Enabled rule with priority 0
    pub fn new(
        rule_id: impl Into<String>,
        name: impl Into<String>,
        condition: RouteCondition,
        handler: SharedHandler,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            name: name.into(),
            priority: 0,
            condition,
            handler,
            enabled: true,
            owner: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn owned_by(mut self, module_id: impl Into<String>) -> Self {
        self.owner = Some(module_id.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn matches(&self, ctx: &ErrorContext, view: &ContextView) -> bool {
        self.enabled && self.condition.matches(ctx, view)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rule_id.trim().is_empty() {
            return Err(FaultlineError::invalid_registration(
                &self.name,
                "rule id must not be empty",
            ));
        }
        if self.name.trim().is_empty() {
            return Err(FaultlineError::invalid_registration(
                &self.rule_id,
                "rule name must not be empty",
            ));
        }
        Ok(())
    }
}
