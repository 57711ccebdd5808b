//! Recovery policies
//!
//! A policy is a named, prioritized rule: when any of its conditions matches
//! a failure, its kind decides which recovery action is attached to the
//! response. The kinds form a closed set dispatched by pattern matching.

use std::time::Duration;

use faultline_common::resilience::{CircuitBreakerConfig, RetryConfig};
use faultline_common::utils::serde::duration_millis;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::classification::Severity;
use super::condition::{any_matches, RouteCondition};
use super::context::ErrorContext;
use crate::constants::{DEFAULT_FALLBACK_TIMEOUT_MS, DEFAULT_RETRYABLE_CODES};
use crate::errors::{FaultlineError, Result};
use crate::utils::path::ContextView;

fn default_true() -> bool {
    true
}

fn default_retryable_codes() -> Vec<String> {
    DEFAULT_RETRYABLE_CODES.iter().map(|code| (*code).to_string()).collect()
}

fn default_fallback_timeout() -> Duration {
    Duration::from_millis(DEFAULT_FALLBACK_TIMEOUT_MS)
}

/// Backoff parameters plus the response codes worth retrying
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    #[serde(flatten)]
    pub backoff: RetryConfig,
    #[serde(default = "default_retryable_codes")]
    pub retryable_codes: Vec<String>,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self { backoff: RetryConfig::default(), retryable_codes: default_retryable_codes() }
    }
}

impl RetryPolicyConfig {
    /// Whether a response carrying `code` may be retried
    pub fn is_retryable(&self, code: Option<&str>) -> bool {
        code.is_some_and(|code| self.retryable_codes.iter().any(|c| c == code))
    }
}

/// Substitute response served when a module fails
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Precomputed substitute copied into the response data
    #[serde(default)]
    pub response: Value,
    /// Advisory deadline for whoever serves the substitute
    #[serde(rename = "timeout_ms", with = "duration_millis", default = "default_fallback_timeout")]
    pub timeout: Duration,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self { enabled: true, response: Value::Null, timeout: default_fallback_timeout() }
    }
}

/// Severities that trigger a notification and where it goes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub severities: Vec<Severity>,
    #[serde(default)]
    pub channels: Vec<String>,
}

/// Closed set of policy kinds with their kind-specific configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum PolicyKind {
    Retry(RetryPolicyConfig),
    Fallback(FallbackConfig),
    Isolation(CircuitBreakerConfig),
    Notification(NotificationConfig),
    Custom(Value),
}

impl PolicyKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Retry(_) => "retry",
            Self::Fallback(_) => "fallback",
            Self::Isolation(_) => "isolation",
            Self::Notification(_) => "notification",
            Self::Custom(_) => "custom",
        }
    }
}

/// A named, prioritized recovery rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPolicy {
    pub policy_id: String,
    pub name: String,
    #[serde(default)]
    pub conditions: Vec<RouteCondition>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(flatten)]
    pub kind: PolicyKind,
}

impl ErrorPolicy {
    /// Enabled, unconditional policy with priority 0
    pub fn new(policy_id: impl Into<String>, name: impl Into<String>, kind: PolicyKind) -> Self {
        Self {
            policy_id: policy_id.into(),
            name: name.into(),
            conditions: Vec::new(),
            enabled: true,
            priority: 0,
            kind,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_condition(mut self, condition: RouteCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether the policy applies to `ctx`, ignoring the enabled flag
    pub fn matches(&self, ctx: &ErrorContext, view: &ContextView) -> bool {
        any_matches(&self.conditions, ctx, view)
    }

    /// Reject policies that cannot be registered
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| FaultlineError::invalid_policy(&self.policy_id, reason);

        if self.policy_id.trim().is_empty() {
            return Err(invalid("policy id must not be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty".into()));
        }
        if self.priority < 0 {
            return Err(invalid(format!("priority must be non-negative, got {}", self.priority)));
        }
        match &self.kind {
            PolicyKind::Retry(config) => {
                config.backoff.validate().map_err(|e| invalid(e.to_string()))
            }
            PolicyKind::Isolation(config) => config.validate().map_err(|e| invalid(e.to_string())),
            PolicyKind::Fallback(_) | PolicyKind::Notification(_) | PolicyKind::Custom(_) => {
                Ok(())
            }
        }
    }
}
