//! Common error types and the classification contract
//!
//! `CommonError` covers the failure patterns the generic building blocks in
//! this crate can produce (configuration validation, serialization, open
//! circuit breakers, cancelled waits). Crate-specific errors compose with it
//! rather than duplicating those variants:
//!
//! ```rust,ignore
//! #[derive(Debug, Error)]
//! pub enum RegistryError {
//!     #[error("module not found: {0}")]
//!     Missing(String),
//!
//!     #[error(transparent)]
//!     Common(#[from] CommonError),
//! }
//! ```
//!
//! Every public error type in the workspace implements
//! [`ErrorClassification`] so callers can make retry and alerting decisions
//! without matching on concrete variants.
//!
//! | Level | Use Case |
//! |-------|----------|
//! | **Info** | Expected conditions, cancelled work |
//! | **Warning** | Degraded but operational (open breaker) |
//! | **Error** | Caller mistakes: invalid config, bad input |
//! | **Critical** | Invariant violations |

use std::fmt;
use std::time::Duration;

/// Standard result type using CommonError
pub type CommonResult<T> = Result<T, CommonError>;

/// Error variants shared by the generic building blocks
#[derive(Debug, Clone, PartialEq)]
pub enum CommonError {
    /// Configuration value rejected during validation
    Config { message: String, field: Option<String> },

    /// Input rejected by a validator
    Validation { field: String, message: String, value: Option<String> },

    /// Serialization or deserialization failure
    Serialization { message: String, format: Option<String> },

    /// A circuit breaker is open for the named service
    CircuitBreakerOpen { service: String, retry_after: Option<Duration> },

    /// A wait was abandoned because the owning resource was closed
    TaskCancelled { task_id: String, reason: Option<String> },
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { message, field: Some(field) } => {
                write!(f, "Configuration error in field '{}': {}", field, message)
            }
            Self::Config { message, field: None } => write!(f, "Configuration error: {}", message),
            Self::Validation { field, message, value: Some(value) } => {
                write!(f, "Validation error for field '{}' (value: '{}'): {}", field, value, message)
            }
            Self::Validation { field, message, value: None } => {
                write!(f, "Validation error for field '{}': {}", field, message)
            }
            Self::Serialization { message, format: Some(format) } => {
                write!(f, "Serialization error ({}): {}", format, message)
            }
            Self::Serialization { message, format: None } => {
                write!(f, "Serialization error: {}", message)
            }
            Self::CircuitBreakerOpen { service, retry_after: Some(retry) } => {
                write!(f, "Circuit breaker open for '{}' (retry in {:?})", service, retry)
            }
            Self::CircuitBreakerOpen { service, retry_after: None } => {
                write!(f, "Circuit breaker open for '{}'", service)
            }
            Self::TaskCancelled { task_id, reason: Some(reason) } => {
                write!(f, "Task '{}' cancelled: {}", task_id, reason)
            }
            Self::TaskCancelled { task_id, reason: None } => {
                write!(f, "Task '{}' cancelled", task_id)
            }
        }
    }
}

impl std::error::Error for CommonError {}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::CircuitBreakerOpen { .. })
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Config { .. } | Self::Validation { .. } | Self::Serialization { .. } => {
                ErrorSeverity::Error
            }
            Self::CircuitBreakerOpen { .. } => ErrorSeverity::Warning,
            Self::TaskCancelled { .. } => ErrorSeverity::Info,
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitBreakerOpen { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl CommonError {
    /// Create a simple configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), field: None }
    }

    /// Create a configuration error for a specific field
    pub fn config_field<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        Self::Config { message: message.into(), field: Some(field.into()) }
    }

    /// Create a validation error
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Validation { field: field.into(), message: message.into(), value: None }
    }

    /// Create a validation error carrying the rejected value
    pub fn validation_with_value<F: Into<String>, M: Into<String>, V: Into<String>>(
        field: F,
        message: M,
        value: V,
    ) -> Self {
        Self::Validation { field: field.into(), message: message.into(), value: Some(value.into()) }
    }

    /// Create a serialization error with format information
    pub fn serialization_format<F: Into<String>, S: Into<String>>(format: F, message: S) -> Self {
        Self::Serialization { message: message.into(), format: Some(format.into()) }
    }

    /// Create an open-breaker error
    pub fn circuit_breaker<S: Into<String>>(service: S, retry_after: Option<Duration>) -> Self {
        Self::CircuitBreakerOpen { service: service.into(), retry_after }
    }

    /// Create a cancellation error
    pub fn task_cancelled<S: Into<String>, R: Into<String>>(task_id: S, reason: R) -> Self {
        Self::TaskCancelled { task_id: task_id.into(), reason: Some(reason.into()) }
    }

    /// Stable, snake_case name of the variant for structured log fields
    pub fn error_type_name(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Validation { .. } => "validation",
            Self::Serialization { .. } => "serialization",
            Self::CircuitBreakerOpen { .. } => "circuit_breaker_open",
            Self::TaskCancelled { .. } => "task_cancelled",
        }
    }
}

/// Error classification trait for consistent error handling across crates
pub trait ErrorClassification {
    /// Whether repeating the failed operation may succeed
    fn is_retryable(&self) -> bool;

    /// Severity used for logging and alerting decisions
    fn severity(&self) -> ErrorSeverity;

    /// Whether the error signals a broken invariant
    fn is_critical(&self) -> bool;

    /// Suggested delay before retrying, when one is known
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Unified severity levels for Rust-side errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Should be monitored but not critical
    Warning,
    /// Requires attention and action
    Error,
    /// Immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

// Standard conversions from common error types
impl From<serde_json::Error> for CommonError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_format("JSON", err.to_string())
    }
}

impl From<toml::de::Error> for CommonError {
    fn from(err: toml::de::Error) -> Self {
        Self::serialization_format("TOML", err.to_string())
    }
}
