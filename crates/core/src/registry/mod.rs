//! Module registry: which modules exist, what they depend on, how they fare

pub mod graph;
pub mod service;
pub mod types;

pub use service::{ModuleRegistry, RegistryStatus};
pub use types::{ModuleFilter, ModuleRegistration};
