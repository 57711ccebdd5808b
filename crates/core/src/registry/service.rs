//! Module registry service

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use faultline_common::lifecycle::{
    AsyncManager, ComponentHealth, LifecycleState, ManagerHealth, ManagerStatus,
};
use faultline_domain::{
    FaultlineError, ModuleConfig, ModuleHealth, ModuleStatus, RegistryConfig, Result,
};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, instrument};

use super::graph::dependency_order;
use super::types::{ModuleFilter, ModuleRegistration};
use crate::utils::require_running;

const COMPONENT: &str = "ModuleRegistry";

struct ModuleEntry {
    registration: ModuleRegistration,
    config: ModuleConfig,
    /// Registration sequence, keeps listings and ordering deterministic
    seq: u64,
}

#[derive(Default)]
struct Modules {
    entries: HashMap<String, ModuleEntry>,
    next_seq: u64,
}

impl Modules {
    fn in_registration_order(&self) -> Vec<(&String, &ModuleEntry)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by_key(|(_, entry)| entry.seq);
        entries
    }

    fn dependents_of(&self, module_id: &str) -> Vec<String> {
        self.in_registration_order()
            .into_iter()
            .filter(|(_, entry)| entry.registration.dependencies.iter().any(|d| d == module_id))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Registry status for the observability layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryStatus {
    pub status: ManagerStatus,
    pub module_count: usize,
    pub healthy_count: usize,
    pub unhealthy_modules: Vec<String>,
}

/// Tracks registered modules, their dependencies and health counters
pub struct ModuleRegistry {
    modules: RwLock<Modules>,
    config: RegistryConfig,
    lifecycle: LifecycleState,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl ModuleRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self { modules: RwLock::new(Modules::default()), config, lifecycle: LifecycleState::new() }
    }

    /// Register or replace a module
    ///
    /// Every declared dependency must already be registered. Replacing an
    /// existing module keeps its health counters and status; a replacement
    /// that would close a dependency cycle is rejected.
    #[instrument(skip(self, registration), fields(module_id = %registration.module_id))]
    pub fn register(&self, registration: ModuleRegistration) -> Result<()> {
        require_running(&self.lifecycle, COMPONENT)?;
        registration.validate()?;

        let mut modules = self.modules.write();
        if let Some(missing) =
            registration.dependencies.iter().find(|dep| !modules.entries.contains_key(*dep))
        {
            return Err(FaultlineError::DependencyNotFound {
                module_id: registration.module_id.clone(),
                dependency: missing.clone(),
            });
        }

        let module_id = registration.module_id.clone();
        if let Some(existing) = modules.entries.get(&module_id) {
            let graph = modules.in_registration_order();
            let candidate = graph.iter().map(|(id, entry)| {
                let deps = if **id == module_id {
                    registration.dependencies.as_slice()
                } else {
                    entry.registration.dependencies.as_slice()
                };
                (id.as_str(), deps)
            });
            dependency_order(candidate)?;

            let config = existing.config.clone();
            let seq = existing.seq;
            modules.entries.insert(module_id.clone(), ModuleEntry { registration, config, seq });
            info!(module_id, "Module re-registered");
        } else {
            let seq = modules.next_seq;
            modules.next_seq += 1;
            modules.entries.insert(
                module_id.clone(),
                ModuleEntry { registration, config: ModuleConfig::default(), seq },
            );
            info!(module_id, "Module registered");
        }
        Ok(())
    }

    /// Remove a module that no other module depends on
    #[instrument(skip(self))]
    pub fn unregister(&self, module_id: &str) -> Result<ModuleRegistration> {
        require_running(&self.lifecycle, COMPONENT)?;

        let mut modules = self.modules.write();
        if !modules.entries.contains_key(module_id) {
            return Err(FaultlineError::ModuleNotFound(module_id.to_string()));
        }
        let dependents = modules.dependents_of(module_id);
        if !dependents.is_empty() {
            return Err(FaultlineError::HasDependents {
                module_id: module_id.to_string(),
                dependents,
            });
        }
        let entry = modules
            .entries
            .remove(module_id)
            .ok_or_else(|| FaultlineError::ModuleNotFound(module_id.to_string()))?;
        info!(module_id, "Module unregistered");
        Ok(entry.registration)
    }

    pub fn get(&self, module_id: &str) -> Result<Option<ModuleRegistration>> {
        require_running(&self.lifecycle, COMPONENT)?;
        Ok(self.modules.read().entries.get(module_id).map(|entry| entry.registration.clone()))
    }

    /// Registrations matching `filter`, in registration order
    pub fn list(&self, filter: &ModuleFilter) -> Result<Vec<ModuleRegistration>> {
        require_running(&self.lifecycle, COMPONENT)?;
        let modules = self.modules.read();
        Ok(modules
            .in_registration_order()
            .into_iter()
            .filter(|(_, entry)| filter.matches(&entry.registration, &entry.config))
            .map(|(_, entry)| entry.registration.clone())
            .collect())
    }

    /// Module ids ordered so every module follows its dependencies
    pub fn dependency_order(&self) -> Result<Vec<String>> {
        require_running(&self.lifecycle, COMPONENT)?;
        let modules = self.modules.read();
        let graph = modules.in_registration_order();
        dependency_order(
            graph
                .iter()
                .map(|(id, entry)| (id.as_str(), entry.registration.dependencies.as_slice())),
        )
    }

    /// Ids of modules that declare `module_id` as a dependency
    pub fn dependents(&self, module_id: &str) -> Result<Vec<String>> {
        require_running(&self.lifecycle, COMPONENT)?;
        Ok(self.modules.read().dependents_of(module_id))
    }

    /// Count a handled failure; unknown modules are ignored
    pub fn increment_success(&self, module_id: &str) -> Result<bool> {
        self.update_config(module_id, ModuleConfig::record_success)
    }

    /// Count an unhandled failure; unknown modules are ignored
    pub fn increment_error(&self, module_id: &str) -> Result<bool> {
        self.update_config(module_id, ModuleConfig::record_error)
    }

    /// Activate or deactivate a module
    pub fn set_status(&self, module_id: &str, status: ModuleStatus) -> Result<()> {
        let found = self.update_config(module_id, |config| {
            config.status = status;
            config.last_updated = chrono::Utc::now();
        })?;
        if found {
            info!(module_id, %status, "Module status changed");
            Ok(())
        } else {
            Err(FaultlineError::ModuleNotFound(module_id.to_string()))
        }
    }

    pub fn module_config(&self, module_id: &str) -> Result<Option<ModuleConfig>> {
        require_running(&self.lifecycle, COMPONENT)?;
        Ok(self.modules.read().entries.get(module_id).map(|entry| entry.config.clone()))
    }

    /// Whether `module_id` is active and within the error-rate threshold
    ///
    /// Unknown modules are reported unhealthy.
    pub fn is_healthy(&self, module_id: &str) -> Result<bool> {
        require_running(&self.lifecycle, COMPONENT)?;
        Ok(self
            .modules
            .read()
            .entries
            .get(module_id)
            .is_some_and(|entry| entry.config.is_healthy(self.config.unhealthy_error_rate)))
    }

    /// Health snapshot of every module, keyed by id
    pub fn all_health(&self) -> Result<BTreeMap<String, ModuleHealth>> {
        require_running(&self.lifecycle, COMPONENT)?;
        let threshold = self.config.unhealthy_error_rate;
        Ok(self
            .modules
            .read()
            .entries
            .iter()
            .map(|(id, entry)| (id.clone(), ModuleHealth::from_config(id, &entry.config, threshold)))
            .collect())
    }

    /// Drop every module and its counters
    pub fn clear(&self) {
        let mut modules = self.modules.write();
        let count = modules.entries.len();
        modules.entries.clear();
        debug!(count, "Module registry cleared");
    }

    pub fn len(&self) -> usize {
        self.modules.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn status_report(&self) -> RegistryStatus {
        let threshold = self.config.unhealthy_error_rate;
        let modules = self.modules.read();
        let unhealthy_modules: Vec<String> = modules
            .in_registration_order()
            .into_iter()
            .filter(|(_, entry)| !entry.config.is_healthy(threshold))
            .map(|(id, _)| id.clone())
            .collect();
        RegistryStatus {
            status: self.lifecycle.get(),
            module_count: modules.entries.len(),
            healthy_count: modules.entries.len() - unhealthy_modules.len(),
            unhealthy_modules,
        }
    }

    fn update_config(&self, module_id: &str, update: impl FnOnce(&mut ModuleConfig)) -> Result<bool> {
        require_running(&self.lifecycle, COMPONENT)?;
        let mut modules = self.modules.write();
        match modules.entries.get_mut(module_id) {
            Some(entry) => {
                update(&mut entry.config);
                Ok(true)
            }
            None => {
                debug!(module_id, "Ignoring counter update for unregistered module");
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl AsyncManager for ModuleRegistry {
    type Error = FaultlineError;

    async fn initialize(&self) -> Result<()> {
        if self.lifecycle.begin_initialize() {
            self.lifecycle.set(ManagerStatus::Running);
            info!("Module registry initialized");
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        if self.lifecycle.begin_shutdown() {
            self.lifecycle.set(ManagerStatus::Shutdown);
            info!(modules = self.len(), "Module registry shut down");
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<ManagerHealth> {
        if !self.lifecycle.is_running() {
            return Ok(ManagerHealth::unhealthy(format!("registry is {}", self.lifecycle.get())));
        }
        let report = self.status_report();
        let mut health = ManagerHealth::healthy();
        for module_id in &report.unhealthy_modules {
            health = health.with_component(ComponentHealth::unhealthy(
                module_id.clone(),
                "module inactive or above error-rate threshold",
            ));
        }
        Ok(health)
    }

    fn status(&self) -> ManagerStatus {
        self.lifecycle.get()
    }

    fn name(&self) -> &'static str {
        COMPONENT
    }
}
