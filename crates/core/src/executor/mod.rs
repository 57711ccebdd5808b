//! Response executor: runs handlers, policies and actions under a
//! concurrency bound

mod actions;
pub mod metrics;
pub mod service;

pub use metrics::{ExecutionMetrics, ExecutionMode};
pub use service::{BatchHandlers, ExecutorStatus, ResponseExecutor};
