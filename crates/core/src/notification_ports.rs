//! Notification port
//!
//! `notify` actions are delivered here. Without a sink the executor logs
//! them instead.

use async_trait::async_trait;
use faultline_domain::{Action, ErrorContext, Severity};
use serde::Serialize;
use serde_json::Value;

/// One operator notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub error_id: String,
    pub module_id: String,
    pub severity: Severity,
    pub message: String,
    pub channels: Vec<String>,
    pub policy_id: Option<String>,
}

impl Notification {
    /// Build the notification a `notify` action describes
    pub fn from_action(action: &Action, ctx: &ErrorContext) -> Self {
        let channels = match action.payload.get("channels") {
            Some(Value::Array(items)) => {
                items.iter().filter_map(|item| item.as_str().map(str::to_string)).collect()
            }
            _ => vec![action.target.clone()],
        };
        Self {
            error_id: ctx.error_id.clone(),
            module_id: ctx.module_id().to_string(),
            severity: ctx.classification.severity,
            message: ctx.message.clone(),
            channels,
            policy_id: action.payload.get("policy_id").and_then(Value::as_str).map(str::to_string),
        }
    }
}

/// Trait for delivering notifications to operators
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification; an `Err` marks the action failed
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}
