//! Helpers over the data model

pub mod path;
