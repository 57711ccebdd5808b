//! Domain constants
//!
//! Response codes, annotation keys, well-known identifiers and the default
//! values the configuration structs fall back to.

// Response codes set by the built-in components
pub const CODE_RETRY_SCHEDULED: &str = "RETRY_SCHEDULED";
pub const CODE_FALLBACK_ACTIVATED: &str = "FALLBACK_ACTIVATED";
pub const CODE_CIRCUIT_BREAKER_OPEN: &str = "CIRCUIT_BREAKER_OPEN";
pub const CODE_HANDLER_FAILURE: &str = "HANDLER_FAILURE";
pub const CODE_POLICY_FAILURE: &str = "POLICY_FAILURE";
pub const CODE_EXECUTION_FAILED: &str = "EXECUTION_FAILED";
pub const CODE_ASYNC_SCHEDULED: &str = "ASYNC_SCHEDULED";
pub const CODE_DEFAULT_HANDLED: &str = "DEFAULT_HANDLED";

// Codes a retry policy treats as transient unless configured otherwise
pub const CODE_NETWORK_ERROR: &str = "NETWORK_ERROR";
pub const CODE_TIMEOUT: &str = "TIMEOUT";
pub const CODE_SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
pub const CODE_RATE_LIMITED: &str = "RATE_LIMITED";
pub const DEFAULT_RETRYABLE_CODES: [&str; 4] =
    [CODE_NETWORK_ERROR, CODE_TIMEOUT, CODE_SERVICE_UNAVAILABLE, CODE_RATE_LIMITED];

// Response annotation keys
pub const ANNOTATION_EXECUTION_ID: &str = "execution_id";
pub const ANNOTATION_POLICIES_APPLIED: &str = "policies_applied";
pub const ANNOTATION_POLICY_ERRORS: &str = "policy_errors";
pub const ANNOTATION_RETRY_EXHAUSTED: &str = "retry_exhausted";
pub const ANNOTATION_EXECUTION_MODE: &str = "execution_mode";
pub const ANNOTATION_RETRY_AFTER_MS: &str = "retry_after_ms";

// Built-in policies
pub const DEFAULT_CRITICAL_NOTIFICATION_POLICY: &str = "default_critical_notification";
pub const DEFAULT_TECHNICAL_RETRY_POLICY: &str = "default_technical_retry";
pub const DEFAULT_CRITICAL_NOTIFICATION_PRIORITY: i32 = 100;
pub const DEFAULT_TECHNICAL_RETRY_PRIORITY: i32 = 50;
pub const DEFAULT_NOTIFICATION_CHANNEL: &str = "log";

// Executor defaults
pub const DEFAULT_MAX_CONCURRENT_EXECUTIONS: usize = 10;
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_MAX_RETRY_WAIT_MS: u64 = 30_000;
pub const METRICS_SAMPLE_CAPACITY: usize = 1000;

// Registry and router defaults
pub const DEFAULT_UNHEALTHY_ERROR_RATE: f64 = 0.10;
pub const DEFAULT_MODULE_RULE_PRIORITY: i32 = 50;
pub const DEFAULT_FALLBACK_TIMEOUT_MS: u64 = 5_000;

/// Id of the routing rule derived from a module registration
pub fn module_rule_id(module_id: &str) -> String {
    format!("module_{module_id}_auto")
}

/// Id of the routing rule derived from a module's n-th custom rule
pub fn module_custom_rule_id(module_id: &str, index: usize) -> String {
    format!("module_{module_id}_custom_{index}")
}
