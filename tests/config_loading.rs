use wavebatch_core::config::AppConfig;
use wavebatch_core::error::BatchError;
use wavebatch_core::types::ExecutionMode;
use wavebatch_test_utils::temp_config;

#[test]
fn test_load_full_config_from_file() {
    let file = temp_config(
        r#"
[execution]
default_mode = "sequential"
max_concurrent = 8
stop_on_error = true
default_timeout_ms = 5000

[limits]
max_operations = 250
max_concurrent = 16
"#,
    );

    let config = AppConfig::load(file.path()).unwrap();
    assert_eq!(config.execution.default_mode, ExecutionMode::Sequential);
    assert_eq!(config.execution.max_concurrent, 8);
    assert!(config.execution.stop_on_error);
    assert_eq!(config.execution.default_timeout_ms, 5000);
    assert_eq!(config.limits.max_operations, 250);
    assert_eq!(config.limits.max_concurrent, 16);
}

#[test]
fn test_env_vars_expanded_before_parsing() {
    std::env::set_var("WAVEBATCH_IT_TIMEOUT", "1234");
    let file = temp_config("[execution]\ndefault_timeout_ms = ${WAVEBATCH_IT_TIMEOUT}\n");

    let config = AppConfig::load(file.path()).unwrap();
    assert_eq!(config.execution.default_timeout_ms, 1234);
    std::env::remove_var("WAVEBATCH_IT_TIMEOUT");
}

#[test]
fn test_missing_explicit_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = AppConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, BatchError::ConfigNotFound(_)));
}

#[test]
fn test_missing_default_file_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::load_or_default(&dir.path().join("wavebatch.toml")).unwrap();
    assert_eq!(config.execution.default_mode, ExecutionMode::Auto);
    assert_eq!(config.execution.max_concurrent, 5);
}

#[test]
fn test_invalid_toml_is_config_error() {
    let file = temp_config("[execution\nmax_concurrent = ");
    let err = AppConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, BatchError::Config(_)));
}

#[test]
fn test_unknown_mode_is_rejected() {
    let file = temp_config("[execution]\ndefault_mode = \"dag\"\n");
    assert!(AppConfig::load(file.path()).is_err());
}

#[test]
fn test_validation_runs_on_load() {
    let file = temp_config("[execution]\nmax_concurrent = 0\n");
    let err = AppConfig::load(file.path()).unwrap_err();
    assert!(err.to_string().contains("max_concurrent"));
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = AppConfig::default();
    let text = toml::to_string_pretty(&config).unwrap();
    assert!(text.contains("default_mode = \"auto\""));
    let back: AppConfig = toml::from_str(&text).unwrap();
    assert_eq!(back.limits.max_operations, config.limits.max_operations);
}
