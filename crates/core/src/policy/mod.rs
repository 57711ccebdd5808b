//! Policy engine: which recovery policies apply to a failure and what they add

pub mod defaults;
pub mod service;

pub use service::{PolicyEngine, PolicyEngineStatus};
