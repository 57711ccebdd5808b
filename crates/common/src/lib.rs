//! Shared building blocks for the faultline workspace.
//!
//! Nothing in here knows about error contexts, policies or routing. The
//! crate only carries the generic pieces the domain and core crates are
//! assembled from.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: errors, error classification, serde helpers
//! - `runtime`: resilience primitives (clock, circuit breakers, retry
//!   state, bulkhead) and lifecycle status/health types
//! - `observability`: tracing (pulled in by `runtime`)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod utils;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod lifecycle;
#[cfg(feature = "runtime")]
pub mod resilience;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use lifecycle::{AsyncManager, ComponentHealth, LifecycleState, ManagerHealth, ManagerStatus};
#[cfg(feature = "runtime")]
pub use resilience::{
    Bulkhead, BulkheadMetrics, BulkheadPermit, CircuitBreakerConfig, CircuitBreakerRegistry,
    CircuitBreakerSnapshot, CircuitState, Clock, MockClock, RetryConfig, RetryState, SystemClock,
};
#[cfg(feature = "foundation")]
pub use utils::serde::duration_millis;
