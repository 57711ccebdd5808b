//! Policies every engine starts with

use faultline_domain::constants::{
    DEFAULT_CRITICAL_NOTIFICATION_POLICY, DEFAULT_CRITICAL_NOTIFICATION_PRIORITY,
    DEFAULT_NOTIFICATION_CHANNEL, DEFAULT_TECHNICAL_RETRY_POLICY, DEFAULT_TECHNICAL_RETRY_PRIORITY,
};
use faultline_domain::{
    ErrorPolicy, ErrorType, NotificationConfig, PolicyKind, RetryPolicyConfig, RouteCondition,
    Severity,
};

/// Notify on every critical failure
pub fn critical_notification() -> ErrorPolicy {
    ErrorPolicy::new(
        DEFAULT_CRITICAL_NOTIFICATION_POLICY,
        "Critical error notification",
        PolicyKind::Notification(NotificationConfig {
            severities: vec![Severity::Critical],
            channels: vec![DEFAULT_NOTIFICATION_CHANNEL.to_string()],
        }),
    )
    .with_priority(DEFAULT_CRITICAL_NOTIFICATION_PRIORITY)
}

/// Retry technical failures with the configured backoff
pub fn technical_retry(retry: &RetryPolicyConfig) -> ErrorPolicy {
    ErrorPolicy::new(
        DEFAULT_TECHNICAL_RETRY_POLICY,
        "Technical error retry",
        PolicyKind::Retry(retry.clone()),
    )
    .with_priority(DEFAULT_TECHNICAL_RETRY_PRIORITY)
    .with_condition(RouteCondition::any().with_error_types([ErrorType::Technical]))
}

/// Both defaults, highest priority first
pub fn default_policies(retry: &RetryPolicyConfig) -> Vec<ErrorPolicy> {
    vec![critical_notification(), technical_retry(retry)]
}
