//! Registration and filter types

use std::fmt;

use faultline_domain::{ErrorPolicy, FaultlineError, ModuleConfig, ModuleRule, ModuleStatus, Result};
use serde_json::Value;

use crate::handler_ports::SharedHandler;

/// A logical module taking part in error handling
#[derive(Clone)]
pub struct ModuleRegistration {
    pub module_id: String,
    pub name: String,
    pub version: String,
    /// Ids of modules that must be registered first
    pub dependencies: Vec<String>,
    /// Handler bound to this module's failures
    pub handler: Option<SharedHandler>,
    /// Policies registered with the engine alongside the module
    pub error_policies: Vec<ErrorPolicy>,
    /// Extra routing rules bound to `handler`
    pub custom_rules: Vec<ModuleRule>,
    /// Free-form category, used by [`ModuleFilter::module_type`]
    pub module_type: Option<String>,
    pub metadata: Value,
}

impl fmt::Debug for ModuleRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistration")
            .field("module_id", &self.module_id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("dependencies", &self.dependencies)
            .field("handler", &self.handler.as_ref().map(|h| h.name().to_string()))
            .field("error_policies", &self.error_policies.len())
            .field("custom_rules", &self.custom_rules.len())
            .field("module_type", &self.module_type)
            .finish()
    }
}

impl ModuleRegistration {
    pub fn new(
        module_id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            name: name.into(),
            version: version.into(),
            dependencies: Vec::new(),
            handler: None,
            error_policies: Vec::new(),
            custom_rules: Vec::new(),
            module_type: None,
            metadata: Value::Null,
        }
    }

    pub fn with_dependency(mut self, module_id: impl Into<String>) -> Self {
        self.dependencies.push(module_id.into());
        self
    }

    pub fn with_handler(mut self, handler: SharedHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policies.push(policy);
        self
    }

    pub fn with_rule(mut self, rule: ModuleRule) -> Self {
        self.custom_rules.push(rule);
        self
    }

    pub fn with_type(mut self, module_type: impl Into<String>) -> Self {
        self.module_type = Some(module_type.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Check the fields that do not depend on other registrations
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| FaultlineError::invalid_registration(&self.module_id, reason);

        if self.module_id.trim().is_empty() {
            return Err(invalid("module id must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.version.trim().is_empty() {
            return Err(invalid("version must not be empty"));
        }
        if self.dependencies.iter().any(|dep| dep == &self.module_id) {
            return Err(invalid("module cannot depend on itself"));
        }
        if self.dependencies.iter().any(|dep| dep.trim().is_empty()) {
            return Err(invalid("dependency ids must not be empty"));
        }
        Ok(())
    }
}

/// Criteria for [`ModuleRegistry::list`](super::ModuleRegistry::list)
///
/// Unset criteria match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleFilter {
    pub module_type: Option<String>,
    pub version: Option<String>,
    pub has_dependencies: Option<bool>,
    pub status: Option<ModuleStatus>,
}

impl ModuleFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn module_type(mut self, module_type: impl Into<String>) -> Self {
        self.module_type = Some(module_type.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn has_dependencies(mut self, has_dependencies: bool) -> Self {
        self.has_dependencies = Some(has_dependencies);
        self
    }

    pub fn status(mut self, status: ModuleStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, registration: &ModuleRegistration, config: &ModuleConfig) -> bool {
        if let Some(module_type) = &self.module_type {
            if registration.module_type.as_deref() != Some(module_type.as_str()) {
                return false;
            }
        }
        if let Some(version) = &self.version {
            if &registration.version != version {
                return false;
            }
        }
        if let Some(has_dependencies) = self.has_dependencies {
            if registration.dependencies.is_empty() == has_dependencies {
                return false;
            }
        }
        if let Some(status) = self.status {
            if config.status != status {
                return false;
            }
        }
        true
    }
}
