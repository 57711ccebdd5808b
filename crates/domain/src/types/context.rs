//! The failure report handed into the system

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::classification::{Classification, ModuleSource};
use super::response::ErrorResponse;

/// Completion callback invoked with the final response of an execution
#[derive(Clone)]
pub struct ResponseCallback(Arc<dyn Fn(ErrorResponse) + Send + Sync>);

impl ResponseCallback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(ErrorResponse) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, response: ErrorResponse) {
        (self.0)(response);
    }
}

impl fmt::Debug for ResponseCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseCallback(..)")
    }
}

/// One reported failure
///
/// Built by the caller at failure time and treated as read-only by every
/// component. The callback is never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    pub error_id: String,
    pub source: ModuleSource,
    pub classification: Classification,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Free-form payload describing the failure
    #[serde(default)]
    pub data: Value,
    /// Free-form configuration of the failing call
    #[serde(default)]
    pub config: Value,
    #[serde(skip)]
    pub callback: Option<ResponseCallback>,
}

impl ErrorContext {
    /// Create a context with a generated error id
    pub fn new(
        source: ModuleSource,
        classification: Classification,
        message: impl Into<String>,
    ) -> Self {
        Self::with_id(Self::generate_id(), source, classification, message)
    }

    /// Create a context with a caller-chosen error id
    pub fn with_id(
        error_id: impl Into<String>,
        source: ModuleSource,
        classification: Classification,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error_id: error_id.into(),
            source,
            classification,
            message: message.into(),
            timestamp: Utc::now(),
            data: Value::Null,
            config: Value::Null,
            callback: None,
        }
    }

    /// Fresh, time-ordered error id
    pub fn generate_id() -> String {
        format!("err_{}", Uuid::now_v7().simple())
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_callback<F>(mut self, f: F) -> Self
    where
        F: Fn(ErrorResponse) + Send + Sync + 'static,
    {
        self.callback = Some(ResponseCallback::new(f));
        self
    }

    /// Id of the module that reported the failure
    pub fn module_id(&self) -> &str {
        &self.source.module_id
    }

    /// Hand `response` to the callback, if one is attached
    ///
    /// Returns whether a callback ran.
    pub fn notify(&self, response: ErrorResponse) -> bool {
        match &self.callback {
            Some(callback) => {
                callback.call(response);
                true
            }
            None => false,
        }
    }
}
