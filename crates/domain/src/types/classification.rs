//! Failure classification
//!
//! Every reported failure is described along five closed axes. The
//! enumerations serialize as snake_case strings, which is also the spelling
//! used by custom route conditions and configuration files.

use serde::{Deserialize, Serialize};

use crate::impl_domain_status_conversions;

/// Where the failure originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    /// Raised by a pipeline module
    Module,
    /// Raised by the hosting process
    System,
    /// Reported by an upstream provider
    External,
    /// Caused by the request itself
    User,
}

impl_domain_status_conversions!(ErrorSource {
    Module => "module",
    System => "system",
    External => "external",
    User => "user",
});

/// Broad category of the failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Business,
    Technical,
    Configuration,
    Resource,
    Dependency,
    Network,
}

impl_domain_status_conversions!(ErrorType {
    Business => "business",
    Technical => "technical",
    Configuration => "configuration",
    Resource => "resource",
    Dependency => "dependency",
    Network => "network",
});

/// How urgent the failure is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl_domain_status_conversions!(Severity {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

/// Blast radius of the failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorImpact {
    SingleModule,
    ModuleChain,
    System,
    UserExperience,
}

impl_domain_status_conversions!(ErrorImpact {
    SingleModule => "single_module",
    ModuleChain => "module_chain",
    System => "system",
    UserExperience => "user_experience",
});

/// Whether and how the failure can be recovered from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorRecoverability {
    Recoverable,
    NonRecoverable,
    AutoRecoverable,
    ManualRecoverable,
}

impl_domain_status_conversions!(ErrorRecoverability {
    Recoverable => "recoverable",
    NonRecoverable => "non_recoverable",
    AutoRecoverable => "auto_recoverable",
    ManualRecoverable => "manual_recoverable",
});

/// The five classification axes of one failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub source: ErrorSource,
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub severity: Severity,
    pub impact: ErrorImpact,
    pub recoverability: ErrorRecoverability,
}

impl Classification {
    /// Module-sourced, single-module, recoverable failure
    pub fn new(error_type: ErrorType, severity: Severity) -> Self {
        Self {
            source: ErrorSource::Module,
            error_type,
            severity,
            impact: ErrorImpact::SingleModule,
            recoverability: ErrorRecoverability::Recoverable,
        }
    }

    pub fn with_source(mut self, source: ErrorSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_impact(mut self, impact: ErrorImpact) -> Self {
        self.impact = impact;
        self
    }

    pub fn with_recoverability(mut self, recoverability: ErrorRecoverability) -> Self {
        self.recoverability = recoverability;
        self
    }
}

/// Identity of the module that reported a failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSource {
    pub module_id: String,
    pub module_name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
}

impl ModuleSource {
    pub fn new(
        module_id: impl Into<String>,
        module_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            module_name: module_name.into(),
            version: version.into(),
            file_path: None,
            line_number: None,
        }
    }

    /// Attach the source location the failure was raised at
    pub fn at(mut self, file_path: impl Into<String>, line_number: u32) -> Self {
        self.file_path = Some(file_path.into());
        self.line_number = Some(line_number);
        self
    }
}
