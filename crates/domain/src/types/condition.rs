//! Match conditions shared by policies and routing rules

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::classification::{ErrorType, Severity};
use super::context::ErrorContext;
use crate::utils::path::ContextView;

/// Predicate over an [`ErrorContext`]
///
/// Every present field must match (AND). A present list matches when it
/// contains the context's value, so an empty list matches nothing. `custom`
/// maps dotted paths to the exact value expected at that path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_types: Option<Vec<ErrorType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severities: Option<Vec<Severity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<BTreeMap<String, Value>>,
}

impl RouteCondition {
    /// Condition that matches every context
    pub fn any() -> Self {
        Self::default()
    }

    pub fn for_modules<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { module_ids: Some(ids.into_iter().map(Into::into).collect()), ..Self::default() }
    }

    pub fn with_error_types(mut self, types: impl IntoIterator<Item = ErrorType>) -> Self {
        self.error_types = Some(types.into_iter().collect());
        self
    }

    pub fn with_severities(mut self, severities: impl IntoIterator<Item = Severity>) -> Self {
        self.severities = Some(severities.into_iter().collect());
        self
    }

    /// Require the value at `path` to equal `expected`
    pub fn with_field(mut self, path: impl Into<String>, expected: impl Into<Value>) -> Self {
        self.custom.get_or_insert_with(BTreeMap::new).insert(path.into(), expected.into());
        self
    }

    /// Whether evaluating this condition needs a [`ContextView`]
    pub fn uses_paths(&self) -> bool {
        self.custom.as_ref().is_some_and(|custom| !custom.is_empty())
    }

    pub fn matches(&self, ctx: &ErrorContext, view: &ContextView) -> bool {
        if let Some(ids) = &self.module_ids {
            if !ids.iter().any(|id| id == ctx.module_id()) {
                return false;
            }
        }
        if let Some(types) = &self.error_types {
            if !types.contains(&ctx.classification.error_type) {
                return false;
            }
        }
        if let Some(severities) = &self.severities {
            if !severities.contains(&ctx.classification.severity) {
                return false;
            }
        }
        if let Some(custom) = &self.custom {
            return custom.iter().all(|(path, expected)| view.lookup(path) == Some(expected));
        }
        true
    }
}

/// Whether any condition in `conditions` matches; an empty list matches all
pub fn any_matches(conditions: &[RouteCondition], ctx: &ErrorContext, view: &ContextView) -> bool {
    conditions.is_empty() || conditions.iter().any(|condition| condition.matches(ctx, view))
}
