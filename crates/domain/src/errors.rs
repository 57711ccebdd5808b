//! Error types for registration and contract failures
//!
//! Execution-local failures (a handler returning `Err`, a policy that cannot
//! be applied) are never surfaced through this type; they are folded into the
//! returned [`ErrorResponse`](crate::ErrorResponse). `FaultlineError` covers
//! caller configuration mistakes and contract violations only.

use std::time::Duration;

use faultline_common::error::{CommonError, ErrorClassification, ErrorSeverity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for faultline
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum FaultlineError {
    #[error("Invalid policy '{policy_id}': {reason}")]
    InvalidPolicy { policy_id: String, reason: String },

    #[error("Invalid registration '{module_id}': {reason}")]
    InvalidRegistration { module_id: String, reason: String },

    #[error("Module '{module_id}' depends on unregistered module '{dependency}'")]
    DependencyNotFound { module_id: String, dependency: String },

    #[error("Circular dependency detected: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    #[error("Module '{module_id}' is still required by: {}", dependents.join(", "))]
    HasDependents { module_id: String, dependents: Vec<String> },

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Policy not found: {0}")]
    PolicyNotFound(String),

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("{component} used before initialize()")]
    NotInitialized { component: String },

    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    #[error("Handler count mismatch: {handlers} handlers for {contexts} contexts")]
    HandlerCountMismatch { contexts: usize, handlers: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for faultline operations
pub type Result<T> = std::result::Result<T, FaultlineError>;

impl FaultlineError {
    pub fn invalid_policy(policy_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPolicy { policy_id: policy_id.into(), reason: reason.into() }
    }

    pub fn invalid_registration(module_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRegistration { module_id: module_id.into(), reason: reason.into() }
    }

    pub fn not_initialized(component: impl Into<String>) -> Self {
        Self::NotInitialized { component: component.into() }
    }

    /// Contract violations by the integrator, as opposed to rejected input
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized { .. }
                | Self::UnknownActionType(_)
                | Self::HandlerCountMismatch { .. }
        )
    }
}

impl ErrorClassification for FaultlineError {
    fn is_retryable(&self) -> bool {
        false
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::ModuleNotFound(_) | Self::PolicyNotFound(_) | Self::RouteNotFound(_) => {
                ErrorSeverity::Warning
            }
            Self::Internal(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl From<CommonError> for FaultlineError {
    fn from(err: CommonError) -> Self {
        match err {
            CommonError::Config { .. }
            | CommonError::Validation { .. }
            | CommonError::Serialization { .. } => Self::Config(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}
