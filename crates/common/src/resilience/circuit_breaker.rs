//! Keyed binary circuit breakers
//!
//! Each key (typically a module id) owns an independent breaker that is
//! either closed or open. Failures increment a counter; once the counter
//! reaches the configured threshold the breaker opens. An open breaker
//! admits calls again once `recovery_time` has passed since the most recent
//! failure. There is no separate half-open state: the outcome of the next
//! recorded call decides whether the breaker closes (success) or stays open
//! with a fresh failure timestamp.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use crate::error::{CommonError, CommonResult};
use crate::utils::serde::duration_millis;

/// Breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls are admitted
    Closed,
    /// Calls are rejected until the recovery window elapses
    Open,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
        }
    }
}

/// Thresholds for a single breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker
    pub threshold: u32,
    /// Time after the last failure before calls are admitted again
    #[serde(rename = "recovery_time_ms", with = "duration_millis")]
    pub recovery_time: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { threshold: 5, recovery_time: Duration::from_secs(60) }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration
    pub fn new(threshold: u32, recovery_time: Duration) -> Self {
        Self { threshold, recovery_time }
    }

    /// Validate the configuration
    pub fn validate(&self) -> CommonResult<()> {
        if self.threshold == 0 {
            return Err(CommonError::config_field("threshold", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Point-in-time view of one breaker
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure: Option<Instant>,
    pub config: CircuitBreakerConfig,
    /// Time left until an open breaker admits calls again
    pub retry_after: Option<Duration>,
}

#[derive(Debug, Clone)]
struct BreakerEntry {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    config: CircuitBreakerConfig,
}

impl BreakerEntry {
    fn new(config: CircuitBreakerConfig) -> Self {
        Self { state: CircuitState::Closed, failure_count: 0, last_failure: None, config }
    }

    fn remaining(&self, now: Instant) -> Option<Duration> {
        if self.state == CircuitState::Closed {
            return None;
        }
        let last = self.last_failure?;
        let elapsed = now.saturating_duration_since(last);
        Some(self.config.recovery_time.saturating_sub(elapsed)).filter(|d| !d.is_zero())
    }

    fn admits(&self, now: Instant) -> bool {
        self.remaining(now).is_none()
    }

    fn record(&mut self, key: &str, success: bool, now: Instant) -> CircuitState {
        if success {
            if self.state == CircuitState::Open {
                info!(key, "Circuit breaker closed after successful call");
            }
            self.failure_count = 0;
            self.state = CircuitState::Closed;
            return self.state;
        }

        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure = Some(now);
        if self.failure_count >= self.config.threshold {
            if self.state == CircuitState::Closed {
                warn!(
                    key,
                    failures = self.failure_count,
                    threshold = self.config.threshold,
                    "Circuit breaker opened"
                );
            }
            self.state = CircuitState::Open;
        }
        self.state
    }

    fn snapshot(&self, now: Instant) -> CircuitBreakerSnapshot {
        CircuitBreakerSnapshot {
            state: self.state,
            failure_count: self.failure_count,
            last_failure: self.last_failure,
            config: self.config,
            retry_after: self.remaining(now),
        }
    }
}

/// Registry of independent breakers keyed by string id
///
/// Entries are created lazily by [`ensure`](Self::ensure) or
/// [`record`](Self::record). Reads for unknown keys treat the breaker as
/// closed.
pub struct CircuitBreakerRegistry<C: Clock = SystemClock> {
    entries: Mutex<HashMap<String, BreakerEntry>>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreakerRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("tracked", &self.len())
            .field("open", &self.open_count())
            .finish()
    }
}

impl CircuitBreakerRegistry<SystemClock> {
    /// Create an empty registry backed by the system clock
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for CircuitBreakerRegistry<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> CircuitBreakerRegistry<C> {
    /// Create an empty registry with a custom clock
    pub fn with_clock(clock: C) -> Self {
        Self { entries: Mutex::new(HashMap::new()), clock: Arc::new(clock) }
    }

    /// Make sure a breaker exists for `key`
    ///
    /// An existing breaker keeps its counters and adopts `config`.
    pub fn ensure(&self, key: &str, config: &CircuitBreakerConfig) {
        let mut entries = self.entries.lock();
        entries
            .entry(key.to_string())
            .and_modify(|entry| entry.config = *config)
            .or_insert_with(|| {
                debug!(key, threshold = config.threshold, "Tracking new circuit breaker");
                BreakerEntry::new(*config)
            });
    }

    /// Record an outcome, creating the breaker from `config` if needed
    pub fn record(&self, key: &str, success: bool, config: &CircuitBreakerConfig) -> CircuitState {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(key.to_string())
            .and_modify(|entry| entry.config = *config)
            .or_insert_with(|| BreakerEntry::new(*config));
        entry.record(key, success, now)
    }

    /// Record an outcome only if a breaker already exists for `key`
    pub fn record_existing(&self, key: &str, success: bool) -> Option<CircuitState> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        entries.get_mut(key).map(|entry| entry.record(key, success, now))
    }

    /// Whether a call for `key` may proceed
    pub fn allows(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.entries.lock().get(key).map_or(true, |entry| entry.admits(now))
    }

    /// Like [`allows`](Self::allows) but reports the remaining wait
    pub fn check(&self, key: &str) -> CommonResult<()> {
        let now = self.clock.now();
        match self.entries.lock().get(key).and_then(|entry| entry.remaining(now)) {
            Some(remaining) => Err(CommonError::circuit_breaker(key, Some(remaining))),
            None => Ok(()),
        }
    }

    /// Snapshot of the breaker for `key`
    pub fn snapshot(&self, key: &str) -> Option<CircuitBreakerSnapshot> {
        let now = self.clock.now();
        self.entries.lock().get(key).map(|entry| entry.snapshot(now))
    }

    /// Close the breaker for `key` and clear its counters
    pub fn reset(&self, key: &str) -> bool {
        match self.entries.lock().get_mut(key) {
            Some(entry) => {
                entry.state = CircuitState::Closed;
                entry.failure_count = 0;
                entry.last_failure = None;
                info!(key, "Circuit breaker manually reset");
                true
            }
            None => false,
        }
    }

    /// Stop tracking `key`
    pub fn remove(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Number of tracked breakers
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no breakers are tracked
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Number of breakers currently open (regardless of recovery window)
    pub fn open_count(&self) -> usize {
        self.entries.lock().values().filter(|entry| entry.state == CircuitState::Open).count()
    }

    /// Drop every breaker
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::clock::MockClock;

    fn registry() -> (CircuitBreakerRegistry<MockClock>, MockClock) {
        let clock = MockClock::new();
        (CircuitBreakerRegistry::with_clock(clock.clone()), clock)
    }

    #[test]
    fn test_config_validation() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());
        assert!(CircuitBreakerConfig::new(0, Duration::from_secs(1)).validate().is_err());
    }

    #[test]
    fn test_unknown_key_is_closed() {
        let (breakers, _) = registry();
        assert!(breakers.allows("missing"));
        assert!(breakers.check("missing").is_ok());
        assert!(breakers.snapshot("missing").is_none());
        assert_eq!(breakers.record_existing("missing", false), None);
        assert!(breakers.is_empty());
    }

    #[test]
    fn test_opens_at_threshold() {
        let (breakers, _) = registry();
        let config = CircuitBreakerConfig::new(2, Duration::from_secs(30));

        assert_eq!(breakers.record("provider", false, &config), CircuitState::Closed);
        assert!(breakers.allows("provider"));
        assert_eq!(breakers.record("provider", false, &config), CircuitState::Open);
        assert!(!breakers.allows("provider"));
        assert_eq!(breakers.open_count(), 1);

        let err = breakers.check("provider").unwrap_err();
        assert!(matches!(err, CommonError::CircuitBreakerOpen { .. }));
    }

    #[test]
    fn test_admits_after_recovery_time_without_closing() {
        let (breakers, clock) = registry();
        let config = CircuitBreakerConfig::new(1, Duration::from_millis(500));

        breakers.record("provider", false, &config);
        assert!(!breakers.allows("provider"));

        clock.advance_millis(499);
        assert!(!breakers.allows("provider"));
        clock.advance_millis(1);
        assert!(breakers.allows("provider"));

        let snapshot = breakers.snapshot("provider").expect("tracked");
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.retry_after, None);

        // The admitted call fails again: a new window starts.
        breakers.record("provider", false, &config);
        assert!(!breakers.allows("provider"));
    }

    #[test]
    fn test_success_resets_failures() {
        let (breakers, _) = registry();
        let config = CircuitBreakerConfig::new(3, Duration::from_secs(1));

        breakers.record("a", false, &config);
        breakers.record("a", false, &config);
        assert_eq!(breakers.snapshot("a").map(|s| s.failure_count), Some(2));

        assert_eq!(breakers.record_existing("a", true), Some(CircuitState::Closed));
        assert_eq!(breakers.snapshot("a").map(|s| s.failure_count), Some(0));
    }

    #[test]
    fn test_ensure_keeps_counters_and_reset_closes() {
        let (breakers, _) = registry();
        let config = CircuitBreakerConfig::new(1, Duration::from_secs(60));

        breakers.ensure("m", &config);
        assert_eq!(breakers.len(), 1);
        breakers.record_existing("m", false);
        breakers.ensure("m", &config);
        assert_eq!(breakers.snapshot("m").map(|s| s.state), Some(CircuitState::Open));

        assert!(breakers.reset("m"));
        assert!(breakers.allows("m"));
        assert!(!breakers.reset("other"));
        assert!(breakers.remove("m"));
    }
}
