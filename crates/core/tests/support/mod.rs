//! Shared test helpers for `faultline-core` integration tests.
//!
//! Context builders, handlers that count their invocations, and a
//! notification sink that records what it was sent.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use faultline_common::lifecycle::AsyncManager;
use faultline_common::resilience::Clock;
use faultline_core::{
    Notification, NotificationSink, ResilienceCenter, ResponseHandler, SharedHandler,
};
use faultline_domain::{
    Classification, ErrorContext, ErrorResponse, ErrorType, FaultlineConfig, ModuleSource,
    Severity,
};
use parking_lot::Mutex;

static TRACING: Once = Once::new();

/// Route test logs through the test writer; `RUST_LOG` selects the level
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Defaults with retry delays short enough for tests
pub fn fast_config() -> FaultlineConfig {
    let mut config = FaultlineConfig::default();
    config.retry.backoff.initial_delay = Duration::from_millis(1);
    config.retry.backoff.max_delay = Duration::from_millis(4);
    config.executor.max_retry_wait = Duration::from_millis(5);
    config
}

/// Initialized center built from `config`
pub async fn started_center(config: FaultlineConfig) -> ResilienceCenter {
    init_tracing();
    let center = ResilienceCenter::new(config).unwrap();
    center.initialize().await.unwrap();
    center
}

/// Initialized center whose breakers run on `clock`
pub async fn started_center_with_clock(
    config: FaultlineConfig,
    clock: Arc<dyn Clock>,
) -> ResilienceCenter {
    init_tracing();
    let center = ResilienceCenter::builder().config(config).clock(clock).build().unwrap();
    center.initialize().await.unwrap();
    center
}

pub fn source(module_id: &str) -> ModuleSource {
    ModuleSource::new(module_id, module_id, "1.0.0")
}

/// Failure reported by `module_id`
pub fn context(module_id: &str, error_type: ErrorType, severity: Severity) -> ErrorContext {
    ErrorContext::new(source(module_id), Classification::new(error_type, severity), "stage failed")
}

/// Low-severity business failure; no default policy matches it
pub fn quiet_context(module_id: &str) -> ErrorContext {
    context(module_id, ErrorType::Business, Severity::Low)
}

/// What a [`CountingHandler`] does when invoked
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    /// Return a failure response carrying this code
    FailWith(&'static str),
    /// Return `Err`
    Error,
    Panic,
}

/// Handler that counts invocations and behaves as configured
pub struct CountingHandler {
    name: String,
    behavior: Mutex<Behavior>,
    calls: AtomicUsize,
}

impl CountingHandler {
    pub fn new(name: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior: Mutex::new(behavior),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn shared(self: &Arc<Self>) -> SharedHandler {
        Arc::clone(self) as SharedHandler
    }
}

#[async_trait]
impl ResponseHandler for CountingHandler {
    async fn execute(&self, ctx: &ErrorContext) -> anyhow::Result<ErrorResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().clone();
        match behavior {
            Behavior::Succeed => Ok(ErrorResponse::success(&ctx.error_id, "recovered")
                .with_data(serde_json::json!({"handled_by": self.name}))),
            Behavior::FailWith(code) => {
                Ok(ErrorResponse::failure(&ctx.error_id, code, "still failing"))
            }
            Behavior::Error => Err(anyhow::anyhow!("{} is unavailable", self.name)),
            Behavior::Panic => panic!("{} blew up", self.name),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Notification sink that keeps every notification
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}

/// Handler name recorded in a [`CountingHandler`] success response
pub fn handled_by(response: &ErrorResponse) -> Option<&str> {
    response.data.get("handled_by").and_then(serde_json::Value::as_str)
}
