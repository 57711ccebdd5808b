//! Resilience primitives
//!
//! Generic, domain-free pieces the policy engine and executor are built on:
//! - **Clock**: time abstraction so breaker recovery can be tested without
//!   sleeping
//! - **Circuit breakers**: a keyed registry of binary (closed/open) breakers
//!   with time-based re-admission
//! - **Retry state**: per-key attempt accounting with capped exponential
//!   backoff
//! - **Bulkhead**: a resizable pool of concurrency slots
//!
//! All shared maps are guarded by one `parking_lot` mutex each. The state
//! per key is a handful of integers, so coarse locking is not a bottleneck.

pub mod bulkhead;
pub mod circuit_breaker;
pub mod clock;
pub mod retry;

pub use bulkhead::{Bulkhead, BulkheadMetrics, BulkheadPermit};
pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerSnapshot, CircuitState,
};
pub use clock::{Clock, MockClock, SystemClock};
pub use retry::{RetryConfig, RetryState};
