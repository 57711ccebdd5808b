//! Dotted-path lookup over a structured view of an error context
//!
//! Custom conditions address fields such as `source.module_id`,
//! `classification.type` or `data.provider.region`. The context is turned
//! into a `serde_json::Value` once per evaluation and paths are walked over
//! that value: objects by key, arrays by decimal index. A path that leaves
//! the structure resolves to `None` and never matches anything.

use serde_json::Value;

use crate::types::ErrorContext;

/// Structured view of an [`ErrorContext`] for path lookups
#[derive(Debug, Clone, PartialEq)]
pub struct ContextView {
    root: Value,
}

impl ContextView {
    /// Build the view of `ctx`
    pub fn of(ctx: &ErrorContext) -> serde_json::Result<Self> {
        Ok(Self { root: serde_json::to_value(ctx)? })
    }

    /// View in which every path is missing
    pub fn empty() -> Self {
        Self { root: Value::Null }
    }

    /// Value at `path`, if present
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        resolve(&self.root, path)
    }
}

/// Walk `path` through `value`
pub fn resolve<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
