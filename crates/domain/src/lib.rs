//! # Faultline Domain
//!
//! Data model for the failure-handling core.
//!
//! This crate contains:
//! - The failure report ([`ErrorContext`]) and its outcome ([`ErrorResponse`],
//!   [`Action`])
//! - Recovery policies and the conditions they match on
//! - Configuration structures with documented defaults
//! - The contract error type [`FaultlineError`] and response codes
//!
//! ## Architecture
//! - Only depends on `faultline-common` for shared primitives
//! - No async code, no I/O
//! - Pure data structures plus matching logic over them

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;
pub mod utils;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
pub use utils::path::ContextView;
