//! The outcome of handling one failure and the recovery steps attached to it

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use faultline_common::utils::serde::duration_millis;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::impl_domain_status_conversions;

/// Closed set of response statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Failure,
    Partial,
    Retry,
    Fallback,
}

impl_domain_status_conversions!(ResponseStatus {
    Success => "success",
    Failure => "failure",
    Partial => "partial",
    Retry => "retry",
    Fallback => "fallback",
});

impl ResponseStatus {
    /// Whether the failure counts as handled for health accounting
    pub const fn is_handled(&self) -> bool {
        matches!(self, Self::Success | Self::Fallback)
    }
}

/// Status, message and machine-readable code of a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseResult {
    pub status: ResponseStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Outcome of handling one [`ErrorContext`](crate::ErrorContext)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub response_id: String,
    pub error_id: String,
    pub result: ResponseResult,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "processing_time_ms", with = "duration_millis", default)]
    pub processing_time: Duration,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub annotations: BTreeMap<String, Value>,
}

impl ErrorResponse {
    /// New response with no code, data or actions
    pub fn new(
        error_id: impl Into<String>,
        status: ResponseStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            response_id: format!("resp_{}", Uuid::now_v7().simple()),
            error_id: error_id.into(),
            result: ResponseResult { status, message: message.into(), code: None },
            timestamp: Utc::now(),
            processing_time: Duration::ZERO,
            data: Value::Null,
            actions: Vec::new(),
            annotations: BTreeMap::new(),
        }
    }

    pub fn success(error_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(error_id, ResponseStatus::Success, message)
    }

    /// Failure response carrying `code`
    pub fn failure(
        error_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(error_id, ResponseStatus::Failure, message).with_code(code)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.result.code = Some(code.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn status(&self) -> ResponseStatus {
        self.result.status
    }

    pub fn code(&self) -> Option<&str> {
        self.result.code.as_deref()
    }

    /// Replace status, code and message in one step
    pub fn set_result(
        &mut self,
        status: ResponseStatus,
        code: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.result =
            ResponseResult { status, message: message.into(), code: Some(code.into()) };
    }

    pub fn annotate(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.annotations.insert(key.into(), value.into());
    }

    pub fn annotation(&self, key: &str) -> Option<&Value> {
        self.annotations.get(key)
    }

    /// Whether every action reached `completed` or `failed`
    pub fn all_actions_terminal(&self) -> bool {
        self.actions.iter().all(Action::is_terminal)
    }
}

/// Kind of recovery step
///
/// Unrecognized names deserialize into [`ActionType::Other`] so a response
/// produced elsewhere can still be inspected; executing one is a contract
/// violation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    Retry,
    Fallback,
    Log,
    Notify,
    Isolate,
    Restart,
    Custom,
    Other(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Retry => "retry",
            Self::Fallback => "fallback",
            Self::Log => "log",
            Self::Notify => "notify",
            Self::Isolate => "isolate",
            Self::Restart => "restart",
            Self::Custom => "custom",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ActionType {
    fn from(name: String) -> Self {
        match name.to_lowercase().as_str() {
            "retry" => Self::Retry,
            "fallback" => Self::Fallback,
            "log" => Self::Log,
            "notify" => Self::Notify,
            "isolate" => Self::Isolate,
            "restart" => Self::Restart,
            "custom" => Self::Custom,
            _ => Self::Other(name),
        }
    }
}

impl From<ActionType> for String {
    fn from(action_type: ActionType) -> Self {
        match action_type {
            ActionType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

/// Progress of one action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Completed,
    Failed,
}

impl_domain_status_conversions!(ActionStatus {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
});

/// One recovery step attached to a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub action_id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub target: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub priority: i32,
    pub status: ActionStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Action {
    /// Pending action of `action_type` aimed at `target`
    pub fn new(action_type: ActionType, target: impl Into<String>, payload: Value) -> Self {
        Self {
            action_id: format!("action_{}", Uuid::new_v4().simple()),
            action_type,
            target: target.into(),
            payload,
            priority: 0,
            status: ActionStatus::Pending,
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn complete(&mut self) {
        self.status = ActionStatus::Completed;
        self.timestamp = Utc::now();
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = ActionStatus::Failed;
        self.error = Some(reason.into());
        self.timestamp = Utc::now();
    }

    pub fn is_terminal(&self) -> bool {
        self.status != ActionStatus::Pending
    }
}
