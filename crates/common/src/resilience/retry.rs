//! Retry accounting with capped exponential backoff
//!
//! [`RetryState`] does not run anything itself. It remembers how many
//! attempts were granted for one key and which delay the next attempt should
//! wait, so the decision to retry and the act of retrying can live in
//! different components.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CommonError, CommonResult};
use crate::utils::serde::duration_millis;

/// Backoff parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts granted before the state reports exhaustion
    pub max_retries: u32,
    /// Delay handed out for the first attempt
    #[serde(rename = "delay_ms", with = "duration_millis")]
    pub initial_delay: Duration,
    /// Factor applied to the delay after every granted attempt
    pub backoff_multiplier: f64,
    /// Upper bound for any delay
    #[serde(rename = "max_delay_ms", with = "duration_millis")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Validate the configuration
    pub fn validate(&self) -> CommonResult<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(CommonError::config_field(
                "backoff_multiplier",
                "must be a finite number >= 1.0",
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(CommonError::config_field("max_delay", "must be >= delay"));
        }
        Ok(())
    }
}

/// Attempt counter and next delay for one retried key
#[derive(Debug, Clone, PartialEq)]
pub struct RetryState {
    attempts: u32,
    max_retries: u32,
    current_delay: Duration,
    backoff_multiplier: f64,
    max_delay: Duration,
}

impl RetryState {
    /// Fresh state with no attempts granted
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            attempts: 0,
            max_retries: config.max_retries,
            current_delay: config.initial_delay.min(config.max_delay),
            backoff_multiplier: config.backoff_multiplier,
            max_delay: config.max_delay,
        }
    }

    /// Whether another attempt may be granted
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_retries
    }

    /// Grant an attempt and return the delay it should wait
    ///
    /// Returns `None` once `max_retries` attempts were granted. Every grant
    /// multiplies the stored delay by the backoff multiplier, capped at the
    /// maximum delay.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.can_retry() {
            return None;
        }
        let delay = self.current_delay;
        self.attempts += 1;

        let scaled = (delay.as_nanos() as f64 * self.backoff_multiplier).round();
        self.current_delay = if scaled >= self.max_delay.as_nanos() as f64 {
            self.max_delay
        } else {
            Duration::from_nanos(scaled as u64)
        };
        Some(delay)
    }

    /// Attempts granted so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Maximum attempts this state will grant
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay the next grant would hand out
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// Multiplier applied after every grant
    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    /// Upper bound for delays
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Attempts still available
    pub fn remaining(&self) -> u32 {
        self.max_retries.saturating_sub(self.attempts)
    }
}
