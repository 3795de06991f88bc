use memsentinel::{Config, Environment, ErrorCategory};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_config_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("memsentinel.toml");

    let mut config = Config::default_for_environment(Environment::Production);
    config.patterns.leak_threshold_mb_per_min = 7.5;
    config.cleanup.level_intervals.critical = Duration::from_secs(5);
    config.save(&path).unwrap();

    let loaded = tokio_test::assert_ok!(Config::load_from_file(&path));
    assert_eq!(loaded, config);
    tokio_test::assert_ok!(loaded.validate());
}

#[test]
fn test_partial_file_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partial.toml");
    fs::write(
        &path,
        r#"
[collection]
interval = "250ms"

[pressure.thresholds]
low = 100.0
moderate = 200.0
high = 300.0
critical = 400.0
"#,
    )
    .unwrap();

    let config = Config::load_from_file(&path).unwrap();
    assert_eq!(config.collection.interval, Duration::from_millis(250));
    assert_eq!(config.pressure.thresholds.critical, 400.0);
    assert_eq!(config.advisor.max_recommendations, 10);
    config.validate().unwrap();
}

#[test]
fn test_invalid_thresholds_fail_validation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(
        &path,
        r#"
[pressure.thresholds]
low = 300.0
moderate = 200.0
high = 400.0
critical = 500.0
"#,
    )
    .unwrap();

    let config = Config::load_from_file(&path).unwrap();
    let err = config.validate().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
}

#[test]
fn test_malformed_file_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "collection = [not valid").unwrap();

    assert!(Config::load_from_file(&path).is_err());
    assert!(Config::load_from_file(&dir.path().join("missing.toml")).is_err());
}

#[test]
fn test_env_style_overrides() {
    let mut config = Config::default();
    config
        .override_from_vars(|key| match key {
            "MEMSENTINEL_HISTORY_CAPACITY" => Some("42".to_string()),
            "MEMSENTINEL_EMERGENCY_THRESHOLD_MB" => Some("4096".to_string()),
            _ => None,
        })
        .unwrap();

    assert_eq!(config.collection.history_capacity, 42);
    assert_eq!(config.cleanup.emergency_threshold_mb, 4096.0);

    let bad = config.override_from_vars(|key| {
        (key == "MEMSENTINEL_HISTORY_CAPACITY").then(|| "many".to_string())
    });
    assert!(bad.is_err());
}
