//! Configuration structures
//!
//! Every field has a documented default so an empty file (or no file at
//! all) yields a working setup. Loading from disk and the environment lives
//! in `faultline-core`.

use std::time::Duration;

use faultline_common::resilience::CircuitBreakerConfig;
use faultline_common::utils::serde::duration_millis;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_CONCURRENT_EXECUTIONS, DEFAULT_MAX_RETRY_WAIT_MS,
    DEFAULT_MODULE_RULE_PRIORITY, DEFAULT_UNHEALTHY_ERROR_RATE,
};
use crate::errors::{FaultlineError, Result};
use crate::types::RetryPolicyConfig;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultlineConfig {
    pub executor: ExecutorConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryPolicyConfig,
    pub registry: RegistryConfig,
    pub router: RouterConfig,
}

impl FaultlineConfig {
    /// Reject values no component can work with
    pub fn validate(&self) -> Result<()> {
        self.circuit_breaker.validate()?;
        self.retry.backoff.validate()?;
        let rate = self.registry.unhealthy_error_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(FaultlineError::Config(format!(
                "registry.unhealthy_error_rate must be within 0.0..=1.0, got {rate}"
            )));
        }
        if self.router.module_rule_priority < 0 {
            return Err(FaultlineError::Config(
                "router.module_rule_priority must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// Executor limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Upper bound on concurrent executions (values below 1 act as 1)
    pub max_concurrent_executions: usize,
    /// Contexts processed together in batch mode (values below 1 act as 1)
    pub batch_size: usize,
    /// Longest a retry action waits out its delay
    #[serde(rename = "max_retry_wait_ms", with = "duration_millis")]
    pub max_retry_wait: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_executions: DEFAULT_MAX_CONCURRENT_EXECUTIONS,
            batch_size: DEFAULT_BATCH_SIZE,
            max_retry_wait: Duration::from_millis(DEFAULT_MAX_RETRY_WAIT_MS),
        }
    }
}

impl ExecutorConfig {
    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrent_executions.max(1)
    }

    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

/// Module registry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Error rate above which an active module is reported unhealthy
    pub unhealthy_error_rate: f64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { unhealthy_error_rate: DEFAULT_UNHEALTHY_ERROR_RATE }
    }
}

/// Response router settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Priority of rules derived from module registrations
    pub module_rule_priority: i32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { module_rule_priority: DEFAULT_MODULE_RULE_PRIORITY }
    }
}
