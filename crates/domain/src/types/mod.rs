//! Data model types

pub mod classification;
pub mod condition;
pub mod context;
pub mod module;
pub mod policy;
pub mod response;

pub use classification::{
    Classification, ErrorImpact, ErrorRecoverability, ErrorSource, ErrorType, ModuleSource,
    Severity,
};
pub use condition::{any_matches, RouteCondition};
pub use context::{ErrorContext, ResponseCallback};
pub use module::{ModuleConfig, ModuleHealth, ModuleRule, ModuleStatus};
pub use policy::{
    ErrorPolicy, FallbackConfig, NotificationConfig, PolicyKind, RetryPolicyConfig,
};
pub use response::{Action, ActionStatus, ActionType, ErrorResponse, ResponseResult, ResponseStatus};
