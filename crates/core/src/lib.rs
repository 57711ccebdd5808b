//! # Faultline Core
//!
//! The failure-handling components and their composition root.
//!
//! This crate contains:
//! - [`ModuleRegistry`]: module registration, dependency order, health
//! - [`PolicyEngine`]: policy matching, circuit breakers, retry accounting
//! - [`ResponseRouter`]: rule-based handler selection
//! - [`ResponseExecutor`]: bounded sync/async/batch execution
//! - [`ResilienceCenter`]: owns one of each and keeps them consistent
//!
//! ## Architecture Principles
//! - Depends on `faultline-common` and `faultline-domain` only
//! - No network I/O: the work itself happens in caller-supplied
//!   [`ResponseHandler`]s and [`NotificationSink`]s
//! - No process-wide state: every component is an explicitly constructed
//!   value shared through `Arc`

pub mod center;
pub mod config;
pub mod executor;
pub mod policy;
pub mod registry;
pub mod router;
mod utils;

// Ports
pub mod handler_ports;
pub mod notification_ports;

pub use center::{CenterStatus, ResilienceCenter, ResilienceCenterBuilder};
pub use executor::{
    BatchHandlers, ExecutionMetrics, ExecutionMode, ExecutorStatus, ResponseExecutor,
};
pub use handler_ports::{handler_fn, DefaultHandler, FnHandler, ResponseHandler, SharedHandler};
pub use notification_ports::{Notification, NotificationSink};
pub use policy::{PolicyEngine, PolicyEngineStatus};
pub use registry::{ModuleFilter, ModuleRegistration, ModuleRegistry, RegistryStatus};
pub use router::{ResponseRouter, RouterStatus, RoutingRule};
