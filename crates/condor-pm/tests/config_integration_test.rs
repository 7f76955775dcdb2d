/// Integration tests for the configuration system
///
/// These tests verify that configuration files and environment variables
/// layer over the defaults and that every value remembers its source.

use condor_pm::config::{native_subdir, Config, ConfigLoader, ConfigSource};
use condor_pm::SolverKind;
use serde_json::json;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_config_defaults() {
    let config = Config::default();

    assert_eq!(config.solver, SolverKind::Sat);
    assert_eq!(config.channels, vec!["conda-forge"]);
    assert_eq!(config.channel_alias, "https://conda.anaconda.org");
    assert_eq!(config.subdirs.first().map(String::as_str), Some(native_subdir()));
    assert!(config.subdirs.contains(&"noarch".to_string()));
    assert!(config.pinned_packages.is_empty());
    assert!(config.solver_flags.allow_uninstall);
    assert!(config.solver_flags.strict_repo_priority);
    assert_eq!(config.acquisition.download_threads, 5);
    assert_eq!(config.acquisition.max_retries, 3);
    assert_eq!(config.acquisition.retry_timeout, Duration::from_secs(2));
    assert!(!config.acquisition.fail_fast);
}

#[test]
fn test_config_loader_env_disabled() {
    let loader = ConfigLoader::new(false);

    assert_eq!(loader.get_condor_env("PATH"), None);
    assert_eq!(loader.get_env_config("solver"), None);
}

#[test]
fn test_config_loader_env_enabled() {
    env::set_var("CONDOR_LOADER_TEST_VAR", "test_value");
    env::set_var("CONDOR_PIN_FILE", "/custom/pinned");

    let loader = ConfigLoader::new(true);

    assert_eq!(loader.get_condor_env("CONDOR_LOADER_TEST_VAR"), Some("test_value".to_string()));
    assert_eq!(loader.get_env_config("pin-file"), Some("/custom/pinned".to_string()));
    assert_eq!(ConfigLoader::env_var_name("strict-channel-priority"), "CONDOR_STRICT_CHANNEL_PRIORITY");

    env::remove_var("CONDOR_LOADER_TEST_VAR");
    env::remove_var("CONDOR_PIN_FILE");
}

#[test]
fn test_config_loader_directories() {
    let loader = ConfigLoader::new(false);

    let home = loader.get_condor_home();
    assert!(home.is_absolute() || home.starts_with(".condor"));

    let cache = loader.get_cache_dir();
    assert!(cache.is_absolute() || cache.ends_with("cache"));
}

#[test]
fn test_load_empty_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("config.json");
    fs::write(&config_file, "{}").unwrap();

    let loader = ConfigLoader::new(false);
    let raw = loader.load_config_file(&config_file).unwrap();
    assert!(raw.values.is_empty());
}

#[test]
fn test_build_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("condor.json");
    fs::write(
        &config_file,
        serde_json::to_string_pretty(&json!({
            "solver": "resolvo",
            "channels": ["bioconda", "conda-forge"],
            "subdirs": ["linux-64", "noarch"],
            "pinned-packages": ["numpy 1.26.*"],
            "strict-channel-priority": false,
            "retry-timeout": 0.5,
            "fail-fast": true,
            "history-path": "/var/lib/condor/history.jsonl",
            "unknown-key": 42
        }))
        .unwrap(),
    )
    .unwrap();

    let config = Config::build(Some(&config_file), false).unwrap();

    assert_eq!(config.solver, SolverKind::Lazy);
    assert_eq!(config.channels, vec!["bioconda", "conda-forge"]);
    assert_eq!(config.pinned_packages, vec!["numpy 1.26.*"]);
    assert!(!config.solver_flags.strict_repo_priority);
    assert_eq!(config.acquisition.retry_timeout, Duration::from_millis(500));
    assert!(config.acquisition.fail_fast);
    assert_eq!(
        config.get_history_path(),
        Some(PathBuf::from("/var/lib/condor/history.jsonl"))
    );

    assert_eq!(config.get_source("solver"), Some(&ConfigSource::File(config_file.clone())));
    assert_eq!(config.get_source("max-retries"), Some(&ConfigSource::Default));
    assert_eq!(config.get_source("unknown-key"), None);

    let targets = config.fetch_targets().unwrap();
    let names: Vec<_> = targets.iter().map(|t| t.to_string()).collect();
    assert_eq!(
        names,
        vec!["bioconda/linux-64", "bioconda/noarch", "conda-forge/linux-64", "conda-forge/noarch"]
    );
}

#[test]
fn test_invalid_value_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("condor.json");
    fs::write(&config_file, r#"{"solver": "minisat"}"#).unwrap();

    let err = Config::build(Some(&config_file), false).unwrap_err();
    assert!(err.to_string().contains("solver"));
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.json");

    assert!(Config::build(Some(&missing), false).is_err());
}

#[test]
fn test_environment_overrides_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("condor.json");
    fs::write(&config_file, r#"{"download-threads": 2, "allow-downgrade": true}"#).unwrap();

    env::set_var("CONDOR_HOME", temp_dir.path());
    env::set_var("CONDOR_DOWNLOAD_THREADS", "9");
    env::set_var("CONDOR_ALLOW_DOWNGRADE", "false");

    let config = Config::build(Some(&config_file), true).unwrap();

    env::remove_var("CONDOR_HOME");
    env::remove_var("CONDOR_DOWNLOAD_THREADS");
    env::remove_var("CONDOR_ALLOW_DOWNGRADE");

    assert_eq!(config.acquisition.download_threads, 9);
    assert!(!config.solver_flags.allow_downgrade);
    assert_eq!(
        config.get_source("download-threads"),
        Some(&ConfigSource::Environment("CONDOR_DOWNLOAD_THREADS".to_string()))
    );
    assert_eq!(config.home_dir(), Some(temp_dir.path()));
    assert_eq!(config.get_history_path(), Some(temp_dir.path().join("history.jsonl")));
}

#[test]
fn test_pins_merge_all_sources() {
    let temp_dir = TempDir::new().unwrap();
    let pin_file = temp_dir.path().join("pinned");
    fs::write(&pin_file, "numpy 1.26.*\nopenssl 3.*\n").unwrap();

    let mut config = Config::default();
    config.pinned_packages = vec!["numpy 1.26.*".to_string()];
    config.pin_file = Some(pin_file);

    let pins = config.pins(&[], &[]).unwrap();
    let names: Vec<_> = pins.specs().iter().filter_map(|p| p.name()).collect();
    assert_eq!(names, vec!["numpy", "openssl"]);
}
