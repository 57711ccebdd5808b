//! Lifecycle management utilities for async components
//!
//! - **[`manager`]**: the [`AsyncManager`] contract, status and health
//!   reporting, and the [`LifecycleState`] cell components keep their status in

pub mod manager;

pub use manager::{AsyncManager, ComponentHealth, LifecycleState, ManagerHealth, ManagerStatus};
