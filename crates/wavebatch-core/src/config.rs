use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BatchError, Result};
use crate::types::ExecutionMode;

/// Top-level wavebatch configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Defaults applied to batch options the caller leaves out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub default_mode: ExecutionMode,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default)]
    pub stop_on_error: bool,
    /// Deadline for operations without their own `timeout_ms`.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_mode: ExecutionMode::default(),
            max_concurrent: default_max_concurrent(),
            stop_on_error: false,
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

/// Hard bounds on what a single submission may ask for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_operations")]
    pub max_operations: usize,
    #[serde(default = "default_max_concurrent_limit")]
    pub max_concurrent: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_operations: default_max_operations(),
            max_concurrent: default_max_concurrent_limit(),
        }
    }
}

fn default_max_concurrent() -> usize { 5 }
fn default_timeout_ms() -> u64 { 30_000 }
fn default_max_operations() -> usize { 100 }
fn default_max_concurrent_limit() -> usize { 20 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| BatchError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| BatchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "Config file absent, using defaults");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.limits.max_concurrent == 0 {
            return Err(BatchError::Config("limits.max_concurrent must be at least 1".into()));
        }
        if self.limits.max_operations == 0 {
            return Err(BatchError::Config("limits.max_operations must be at least 1".into()));
        }
        if self.execution.max_concurrent == 0
            || self.execution.max_concurrent > self.limits.max_concurrent
        {
            return Err(BatchError::Config(format!(
                "execution.max_concurrent must be between 1 and {}",
                self.limits.max_concurrent
            )));
        }
        Ok(())
    }
}

/// Substitute `${NAME}` and `${NAME:-fallback}` with environment values.
/// An unset variable without a fallback is left as written, as is an
/// unterminated `${`.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let expr = &after[..close];
        let (name, fallback) = match expr.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (expr, None),
        };
        match (std::env::var(name), fallback) {
            (Ok(value), _) => out.push_str(&value),
            (Err(_), Some(fallback)) => out.push_str(fallback),
            (Err(_), None) => out.push_str(&rest[open..open + close + 3]),
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_WAVEBATCH_VAR", "7");
        let result = expand_env_vars("max_concurrent = ${TEST_WAVEBATCH_VAR}");
        assert_eq!(result, "max_concurrent = 7");
        std::env::remove_var("TEST_WAVEBATCH_VAR");
    }

    #[test]
    fn test_expand_env_vars_fallback_and_unterminated() {
        assert_eq!(
            expand_env_vars("n = ${NONEXISTENT_WAVEBATCH_VAR:-3}"),
            "n = 3"
        );
        assert_eq!(expand_env_vars("x = \"${OPEN"), "x = \"${OPEN");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_WAVEBATCH_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_WAVEBATCH_VAR}\"");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.execution.default_mode, ExecutionMode::Auto);
        assert_eq!(config.execution.max_concurrent, 5);
        assert!(!config.execution.stop_on_error);
        assert_eq!(config.execution.default_timeout_ms, 30_000);
        assert_eq!(config.limits.max_operations, 100);
        assert_eq!(config.limits.max_concurrent, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_execution_section() {
        let toml_str = r#"
[execution]
default_mode = "parallel"
stop_on_error = true
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.execution.default_mode, ExecutionMode::Parallel);
        assert!(config.execution.stop_on_error);
        assert_eq!(config.execution.max_concurrent, 5);
    }

    #[test]
    fn test_validate_rejects_concurrency_above_limit() {
        let toml_str = r#"
[execution]
max_concurrent = 50

[limits]
max_concurrent = 20
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(matches!(config.validate(), Err(BatchError::Config(_))));
    }
}
