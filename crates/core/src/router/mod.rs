//! Response router: picks the handler for a failure

pub mod service;
pub mod types;

pub use service::{ResponseRouter, RouterStatus};
pub use types::RoutingRule;
