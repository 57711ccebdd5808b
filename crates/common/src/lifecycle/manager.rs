//! Lifecycle contract shared by the long-lived components
//!
//! Components are created cheaply, become usable after `initialize`, and
//! refuse work again after `shutdown`. Both calls take `&self` so a component
//! can be shared behind an `Arc` by the composition root and by callers at
//! the same time.

use std::fmt;
use std::time::SystemTime;

use parking_lot::RwLock;
use serde::Serialize;

/// Standard lifecycle trait for all manager types
#[async_trait::async_trait]
pub trait AsyncManager: Send + Sync {
    /// Error type for this manager
    type Error: std::error::Error + Send + Sync + 'static;

    /// Acquire resources and start accepting work
    ///
    /// Calling this on a running manager is a no-op.
    async fn initialize(&self) -> Result<(), Self::Error>;

    /// Stop accepting work and release resources
    async fn shutdown(&self) -> Result<(), Self::Error>;

    /// Check if the manager is healthy and operational
    async fn health_check(&self) -> Result<ManagerHealth, Self::Error>;

    /// Current lifecycle status
    fn status(&self) -> ManagerStatus;

    /// Name used in logs and health reports
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Manager lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerStatus {
    /// Created but not initialized
    Created,
    /// Initialization in progress
    Initializing,
    /// Running and operational
    Running,
    /// Shutdown in progress
    ShuttingDown,
    /// Shut down; may be initialized again
    Shutdown,
    /// Initialization failed
    Error,
}

impl fmt::Display for ManagerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Initializing => write!(f, "Initializing"),
            Self::Running => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "Shutting Down"),
            Self::Shutdown => write!(f, "Shutdown"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Manager health status
#[derive(Debug, Clone, Serialize)]
pub struct ManagerHealth {
    /// Overall health status
    pub is_healthy: bool,
    /// Health score from 0.0 (unhealthy) to 1.0 (perfectly healthy)
    pub score: f64,
    /// Optional health message
    pub message: Option<String>,
    /// Individual component health checks
    pub components: Vec<ComponentHealth>,
    /// Timestamp of health check
    pub timestamp: SystemTime,
}

impl ManagerHealth {
    /// Create a healthy status
    pub fn healthy() -> Self {
        Self {
            is_healthy: true,
            score: 1.0,
            message: None,
            components: Vec::new(),
            timestamp: SystemTime::now(),
        }
    }

    /// Create an unhealthy status with a message
    pub fn unhealthy<S: Into<String>>(message: S) -> Self {
        Self {
            is_healthy: false,
            score: 0.0,
            message: Some(message.into()),
            components: Vec::new(),
            timestamp: SystemTime::now(),
        }
    }

    /// Create a degraded status with a score
    pub fn degraded<S: Into<String>>(score: f64, message: S) -> Self {
        let score = score.clamp(0.0, 1.0);
        Self {
            is_healthy: score > 0.5,
            score,
            message: Some(message.into()),
            components: Vec::new(),
            timestamp: SystemTime::now(),
        }
    }

    /// Add a component health check
    ///
    /// An unhealthy component marks the whole report unhealthy.
    pub fn with_component(mut self, component: ComponentHealth) -> Self {
        if !component.is_healthy {
            self.is_healthy = false;
            self.score = self.score.min(0.5);
        }
        self.components.push(component);
        self
    }
}

/// Individual component health within a manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub is_healthy: bool,
    pub message: Option<String>,
}

impl ComponentHealth {
    pub fn healthy<S: Into<String>>(name: S) -> Self {
        Self { name: name.into(), is_healthy: true, message: None }
    }

    pub fn unhealthy<S: Into<String>, M: Into<String>>(name: S, message: M) -> Self {
        Self { name: name.into(), is_healthy: false, message: Some(message.into()) }
    }
}

/// Status cell a manager keeps its [`ManagerStatus`] in
#[derive(Debug)]
pub struct LifecycleState {
    status: RwLock<ManagerStatus>,
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleState {
    /// New cell in [`ManagerStatus::Created`]
    pub fn new() -> Self {
        Self { status: RwLock::new(ManagerStatus::Created) }
    }

    /// Current status
    pub fn get(&self) -> ManagerStatus {
        *self.status.read()
    }

    /// Overwrite the status
    pub fn set(&self, status: ManagerStatus) {
        *self.status.write() = status;
    }

    /// Whether the manager accepts work
    pub fn is_running(&self) -> bool {
        self.get() == ManagerStatus::Running
    }

    /// Move to `next` if the current status is one of `from`
    ///
    /// Returns whether the transition happened. The check and the write are
    /// one atomic step, so two concurrent `initialize` calls cannot both win.
    pub fn transition(&self, from: &[ManagerStatus], next: ManagerStatus) -> bool {
        let mut status = self.status.write();
        if from.contains(&status) {
            *status = next;
            true
        } else {
            false
        }
    }

    /// Claim initialization: `Created`, `Shutdown` or `Error` to `Initializing`
    pub fn begin_initialize(&self) -> bool {
        self.transition(
            &[ManagerStatus::Created, ManagerStatus::Shutdown, ManagerStatus::Error],
            ManagerStatus::Initializing,
        )
    }

    /// Claim shutdown: `Running` to `ShuttingDown`
    pub fn begin_shutdown(&self) -> bool {
        self.transition(&[ManagerStatus::Running], ManagerStatus::ShuttingDown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let state = LifecycleState::new();
        assert_eq!(state.get(), ManagerStatus::Created);
        assert!(!state.begin_shutdown());

        assert!(state.begin_initialize());
        assert!(!state.begin_initialize());
        state.set(ManagerStatus::Running);
        assert!(state.is_running());

        assert!(state.begin_shutdown());
        state.set(ManagerStatus::Shutdown);
        assert!(state.begin_initialize());
    }

    #[test]
    fn test_unhealthy_component_degrades_report() {
        let health = ManagerHealth::healthy()
            .with_component(ComponentHealth::healthy("breakers"))
            .with_component(ComponentHealth::unhealthy("modules", "2 modules failing"));
        assert!(!health.is_healthy);
        assert_eq!(health.components.len(), 2);
        assert!(health.score <= 0.5);
    }

    #[test]
    fn test_degraded_clamps_score() {
        let health = ManagerHealth::degraded(1.7, "odd");
        assert_eq!(health.score, 1.0);
        assert!(health.is_healthy);
        assert!(!ManagerHealth::degraded(0.2, "bad").is_healthy);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ManagerStatus::ShuttingDown.to_string(), "Shutting Down");
    }
}
