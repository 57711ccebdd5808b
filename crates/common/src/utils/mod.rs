//! Serialization helpers shared by configuration and data-model types

pub mod serde;

pub use self::serde::duration_millis;
