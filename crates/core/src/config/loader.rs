//! Configuration loader
//!
//! Builds a [`FaultlineConfig`] from an optional file plus environment
//! overrides.
//!
//! ## Loading Strategy
//! 1. Probe the standard locations for a config file
//! 2. Fall back to defaults when none exists
//! 3. Apply environment overrides on top
//! 4. Validate the result
//!
//! ## Environment Variables
//! - `FAULTLINE_MAX_CONCURRENT_EXECUTIONS`: executor concurrency bound
//! - `FAULTLINE_BATCH_SIZE`: contexts per batch chunk
//! - `FAULTLINE_CB_THRESHOLD`: consecutive failures that open a breaker
//! - `FAULTLINE_CB_RECOVERY_MS`: breaker recovery time in milliseconds
//! - `FAULTLINE_RETRY_MAX`: retries granted per error
//! - `FAULTLINE_RETRY_DELAY_MS`: delay of the first retry
//! - `FAULTLINE_UNHEALTHY_ERROR_RATE`: module error rate treated as unhealthy
//!
//! ## File Locations
//! Probed in order, relative to the working directory:
//! 1. `faultline.toml`, `faultline.json`
//! 2. `config/faultline.toml`, `config/faultline.json`

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use faultline_domain::{FaultlineConfig, FaultlineError, Result};

const CANDIDATES: [&str; 4] =
    ["faultline.toml", "faultline.json", "config/faultline.toml", "config/faultline.json"];

/// Load configuration from the first file found, or defaults, then apply
/// environment overrides
///
/// # Errors
/// Returns `FaultlineError::Config` if a file cannot be read or parsed, an
/// override is not a valid number, or the result fails validation.
pub fn load() -> Result<FaultlineConfig> {
    let mut config = match probe_config_paths() {
        Some(path) => read_file(&path)?,
        None => {
            tracing::debug!("No config file found, using defaults");
            FaultlineConfig::default()
        }
    };
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Load and validate configuration from `path`
///
/// The format is detected from the extension (`.toml` or `.json`).
/// Environment overrides are not applied.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<FaultlineConfig> {
    let config = read_file(path.as_ref())?;
    config.validate()?;
    Ok(config)
}

fn read_file(path: &Path) -> Result<FaultlineConfig> {
    if !path.exists() {
        return Err(FaultlineError::Config(format!("Config file not found: {}", path.display())));
    }
    tracing::info!(path = %path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(path).map_err(|e| {
        FaultlineError::Config(format!("Failed to read {}: {e}", path.display()))
    })?;
    parse_config(&contents, path)
}

/// Parse configuration text, choosing the format from `path`'s extension
///
/// Missing sections and fields take their defaults. The result is not
/// validated.
pub fn parse_config(contents: &str, path: &Path) -> Result<FaultlineConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| FaultlineError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| FaultlineError::Config(format!("Invalid JSON format: {e}"))),
        other => Err(FaultlineError::Config(format!("Unsupported config format: {other}"))),
    }
}

/// First existing config file among the standard locations
pub fn probe_config_paths() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    CANDIDATES.iter().map(|candidate| cwd.join(candidate)).find(|path| path.exists())
}

/// Overwrite fields of `config` from `FAULTLINE_*` variables that are set
pub fn apply_env_overrides(config: &mut FaultlineConfig) -> Result<()> {
    if let Some(max) = env_value("FAULTLINE_MAX_CONCURRENT_EXECUTIONS")? {
        config.executor.max_concurrent_executions = max;
    }
    if let Some(size) = env_value("FAULTLINE_BATCH_SIZE")? {
        config.executor.batch_size = size;
    }
    if let Some(threshold) = env_value("FAULTLINE_CB_THRESHOLD")? {
        config.circuit_breaker.threshold = threshold;
    }
    if let Some(ms) = env_value("FAULTLINE_CB_RECOVERY_MS")? {
        config.circuit_breaker.recovery_time = Duration::from_millis(ms);
    }
    if let Some(max) = env_value("FAULTLINE_RETRY_MAX")? {
        config.retry.backoff.max_retries = max;
    }
    if let Some(ms) = env_value("FAULTLINE_RETRY_DELAY_MS")? {
        config.retry.backoff.initial_delay = Duration::from_millis(ms);
    }
    if let Some(rate) = env_value("FAULTLINE_UNHEALTHY_ERROR_RATE")? {
        config.registry.unhealthy_error_rate = rate;
    }
    Ok(())
}

/// Parsed value of `key`, or `None` when unset or blank
fn env_value<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| FaultlineError::Config(format!("Invalid value for {key}: {e}"))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use tempfile::{Builder, NamedTempFile};

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const OVERRIDES: [&str; 7] = [
        "FAULTLINE_MAX_CONCURRENT_EXECUTIONS",
        "FAULTLINE_BATCH_SIZE",
        "FAULTLINE_CB_THRESHOLD",
        "FAULTLINE_CB_RECOVERY_MS",
        "FAULTLINE_RETRY_MAX",
        "FAULTLINE_RETRY_DELAY_MS",
        "FAULTLINE_UNHEALTHY_ERROR_RATE",
    ];

    fn clear_overrides() {
        for key in OVERRIDES {
            std::env::remove_var(key);
        }
    }

    fn temp_config(extension: &str, contents: &str) -> NamedTempFile {
        let mut file = Builder::new().suffix(extension).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_content = r#"
[executor]
max_concurrent_executions = 4

[circuit_breaker]
threshold = 3
recovery_time_ms = 500

[retry]
max_retries = 5
delay_ms = 250
retryable_codes = ["TIMEOUT"]
"#;
        let config = parse_config(toml_content, Path::new("faultline.toml")).unwrap();
        assert_eq!(config.executor.max_concurrent_executions, 4);
        assert_eq!(config.executor.batch_size, 10);
        assert_eq!(config.circuit_breaker.threshold, 3);
        assert_eq!(config.circuit_breaker.recovery_time, Duration::from_millis(500));
        assert_eq!(config.retry.backoff.max_retries, 5);
        assert_eq!(config.retry.backoff.initial_delay, Duration::from_millis(250));
        assert_eq!(config.retry.retryable_codes, vec!["TIMEOUT".to_string()]);
    }

    #[test]
    fn test_parse_config_json() {
        let json_content = r#"{
            "registry": { "unhealthy_error_rate": 0.25 },
            "router": { "module_rule_priority": 70 }
        }"#;
        let config = parse_config(json_content, Path::new("faultline.json")).unwrap();
        assert_eq!(config.registry.unhealthy_error_rate, 0.25);
        assert_eq!(config.router.module_rule_priority, 70);
        assert_eq!(config.executor, FaultlineConfig::default().executor);
    }

    #[test]
    fn test_parse_config_empty_is_default() {
        let config = parse_config("", Path::new("faultline.toml")).unwrap();
        assert_eq!(config, FaultlineConfig::default());
    }

    #[test]
    fn test_parse_config_unsupported_format() {
        let result = parse_config("a: 1", Path::new("faultline.yaml"));
        assert!(matches!(result, Err(FaultlineError::Config(msg)) if msg.contains("yaml")));
    }

    #[test]
    fn test_load_from_file_toml() {
        let file = temp_config(".toml", "[executor]\nbatch_size = 3\n");
        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.executor.batch_size, 3);
    }

    #[test]
    fn test_load_from_file_rejects_invalid_values() {
        let file = temp_config(".json", r#"{ "registry": { "unhealthy_error_rate": 2.0 } }"#);
        assert!(matches!(load_from_file(file.path()), Err(FaultlineError::Config(_))));
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let file = temp_config(".json", r#"{ "executor": "#);
        assert!(matches!(load_from_file(file.path()), Err(FaultlineError::Config(_))));
    }

    #[test]
    fn test_load_from_file_not_found() {
        let result = load_from_file("/nonexistent/faultline.toml");
        assert!(matches!(result, Err(FaultlineError::Config(msg)) if msg.contains("not found")));
    }

    #[test]
    fn test_env_overrides_applied() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        clear_overrides();
        std::env::set_var("FAULTLINE_MAX_CONCURRENT_EXECUTIONS", "32");
        std::env::set_var("FAULTLINE_CB_RECOVERY_MS", "1500");
        std::env::set_var("FAULTLINE_RETRY_MAX", " 7 ");
        std::env::set_var("FAULTLINE_UNHEALTHY_ERROR_RATE", "0.5");
        std::env::set_var("FAULTLINE_BATCH_SIZE", "");

        let mut config = FaultlineConfig::default();
        apply_env_overrides(&mut config).unwrap();
        clear_overrides();

        assert_eq!(config.executor.max_concurrent_executions, 32);
        assert_eq!(config.executor.batch_size, 10);
        assert_eq!(config.circuit_breaker.recovery_time, Duration::from_millis(1500));
        assert_eq!(config.retry.backoff.max_retries, 7);
        assert_eq!(config.registry.unhealthy_error_rate, 0.5);
    }

    #[test]
    fn test_env_override_invalid_number() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        clear_overrides();
        std::env::set_var("FAULTLINE_CB_THRESHOLD", "many");

        let result = apply_env_overrides(&mut FaultlineConfig::default());
        clear_overrides();
        assert!(
            matches!(result, Err(FaultlineError::Config(msg)) if msg.contains("FAULTLINE_CB_THRESHOLD"))
        );
    }
}
