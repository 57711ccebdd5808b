//! Runtime bookkeeping for registered modules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::condition::RouteCondition;
use crate::impl_domain_status_conversions;

fn default_true() -> bool {
    true
}

/// Whether a module takes part in error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    #[default]
    Active,
    Inactive,
}

impl_domain_status_conversions!(ModuleStatus {
    Active => "active",
    Inactive => "inactive",
});

/// Per-module health counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub status: ModuleStatus,
    pub error_count: u64,
    pub success_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            status: ModuleStatus::Active,
            error_count: 0,
            success_count: 0,
            last_updated: Utc::now(),
        }
    }
}

impl ModuleConfig {
    /// Fraction of recorded outcomes that were errors (0.0 with no outcomes)
    pub fn error_rate(&self) -> f64 {
        let total = self.error_count + self.success_count;
        if total == 0 {
            0.0
        } else {
            self.error_count as f64 / total as f64
        }
    }

    /// Active and at or below `max_error_rate`
    pub fn is_healthy(&self, max_error_rate: f64) -> bool {
        self.status == ModuleStatus::Active && self.error_rate() <= max_error_rate
    }

    pub fn record_success(&mut self) {
        self.success_count = self.success_count.saturating_add(1);
        self.last_updated = Utc::now();
    }

    pub fn record_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
        self.last_updated = Utc::now();
    }
}

/// Health snapshot of one module
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleHealth {
    pub module_id: String,
    pub status: ModuleStatus,
    pub healthy: bool,
    pub error_count: u64,
    pub success_count: u64,
    pub error_rate: f64,
    pub last_updated: DateTime<Utc>,
}

impl ModuleHealth {
    pub fn from_config(module_id: impl Into<String>, config: &ModuleConfig, max_error_rate: f64) -> Self {
        Self {
            module_id: module_id.into(),
            status: config.status,
            healthy: config.is_healthy(max_error_rate),
            error_count: config.error_count,
            success_count: config.success_count,
            error_rate: config.error_rate(),
            last_updated: config.last_updated,
        }
    }
}

/// Routing rule a module contributes at registration time
///
/// The rule is bound to the registering module's handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    pub name: String,
    /// Falls back to the configured module-rule priority when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default)]
    pub condition: RouteCondition,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ModuleRule {
    pub fn new(name: impl Into<String>, condition: RouteCondition) -> Self {
        Self { rule_id: None, name: name.into(), priority: None, condition, enabled: true }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
}
