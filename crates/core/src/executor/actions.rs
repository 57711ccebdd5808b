//! Action execution
//!
//! Actions run one after another in list order. A failing action is marked
//! `failed` and the rest still run; only an action type the executor does
//! not know aborts the execution, and that is checked before anything runs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context as _};
use faultline_domain::{
    Action, ActionType, ErrorContext, ErrorResponse, FaultlineError, Result, Severity,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::notification_ports::{Notification, NotificationSink};

/// Fail on the first action type that has no executor
pub(crate) fn ensure_known_actions(response: &ErrorResponse) -> Result<()> {
    match response.actions.iter().find(|action| matches!(action.action_type, ActionType::Other(_)))
    {
        Some(action) => Err(FaultlineError::UnknownActionType(action.action_type.to_string())),
        None => Ok(()),
    }
}

/// Executes the actions attached to a response
pub(crate) struct ActionRunner {
    pub(crate) notifier: Option<Arc<dyn NotificationSink>>,
    pub(crate) max_retry_wait: Duration,
}

impl ActionRunner {
    /// Run every pending action of `response`, recording each outcome
    pub(crate) async fn run_all(&self, ctx: &ErrorContext, response: &mut ErrorResponse) {
        for action in response.actions.iter_mut().filter(|action| !action.is_terminal()) {
            match self.run(ctx, action).await {
                Ok(()) => action.complete(),
                Err(err) => {
                    warn!(
                        action_id = %action.action_id,
                        action_type = %action.action_type,
                        error = %err,
                        "Action failed"
                    );
                    action.fail(format!("{err:#}"));
                }
            }
        }
    }

    async fn run(&self, ctx: &ErrorContext, action: &Action) -> anyhow::Result<()> {
        match &action.action_type {
            ActionType::Retry => self.wait_retry_delay(action).await,
            ActionType::Log => {
                log_at_severity(ctx, action);
                Ok(())
            }
            ActionType::Notify => self.notify(ctx, action).await,
            ActionType::Fallback => {
                let timeout_ms = action.payload.get("timeout_ms").and_then(Value::as_u64);
                info!(error_id = %ctx.error_id, ?timeout_ms, "Fallback response served");
                Ok(())
            }
            ActionType::Isolate => {
                info!(module_id = %action.target, "Module isolation requested");
                Ok(())
            }
            ActionType::Restart => {
                info!(module_id = %action.target, "Module restart requested");
                Ok(())
            }
            ActionType::Custom => {
                debug!(action_target = %action.target, "Custom action handed to caller");
                Ok(())
            }
            ActionType::Other(name) => Err(anyhow!("no executor for action type '{name}'")),
        }
    }

    async fn wait_retry_delay(&self, action: &Action) -> anyhow::Result<()> {
        let delay_ms = action
            .payload
            .get("delay_ms")
            .and_then(Value::as_u64)
            .context("retry action has no numeric delay_ms")?;
        let delay = Duration::from_millis(delay_ms).min(self.max_retry_wait);
        debug!(delay_ms = delay.as_millis() as u64, "Waiting out retry delay");
        tokio::time::sleep(delay).await;
        Ok(())
    }

    async fn notify(&self, ctx: &ErrorContext, action: &Action) -> anyhow::Result<()> {
        let notification = Notification::from_action(action, ctx);
        match &self.notifier {
            Some(sink) => sink
                .notify(&notification)
                .await
                .with_context(|| format!("notification for {} not delivered", ctx.error_id)),
            None => {
                warn!(
                    error_id = %notification.error_id,
                    module_id = %notification.module_id,
                    severity = %notification.severity,
                    channels = ?notification.channels,
                    message = %notification.message,
                    "Operator notification"
                );
                Ok(())
            }
        }
    }
}

fn log_at_severity(ctx: &ErrorContext, action: &Action) {
    let message =
        action.payload.get("message").and_then(Value::as_str).unwrap_or(ctx.message.as_str());
    let module_id = ctx.module_id();
    match ctx.classification.severity {
        Severity::Low => debug!(error_id = %ctx.error_id, module_id, "{message}"),
        Severity::Medium => info!(error_id = %ctx.error_id, module_id, "{message}"),
        Severity::High => warn!(error_id = %ctx.error_id, module_id, "{message}"),
        Severity::Critical => error!(error_id = %ctx.error_id, module_id, "{message}"),
    }
}
