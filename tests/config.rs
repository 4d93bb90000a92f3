//! Configuration loading from files and the environment

use shardroute::common::{Config, EnableAllocation};
use shardroute::{AllocationEngine, Error};
use std::io::Write;
use tempfile::NamedTempFile;

fn toml_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_from_file() {
    let file = toml_file(
        r#"
[allocation]
node_concurrent_recoveries = 5
enable = "primaries"
"#,
    );

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.allocation.node_concurrent_recoveries, 5);
    assert_eq!(config.allocation.enable, EnableAllocation::Primaries);

    let engine = AllocationEngine::from_config(&config).unwrap();
    assert_eq!(engine.settings(), &config.allocation);
}

#[test]
fn test_missing_sections_use_defaults() {
    let file = toml_file("[allocation]\n");
    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.allocation.node_concurrent_recoveries, 2);
    assert_eq!(config.allocation.enable, EnableAllocation::All);
}

#[test]
fn test_zero_recoveries_rejected() {
    let file = toml_file(
        r#"
[allocation]
node_concurrent_recoveries = 0
"#,
    );
    let result = Config::load(Some(file.path()));
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = Config::load(Some(&dir.path().join("absent.toml")));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_env_overrides_log_level() {
    let file = toml_file("log_level = \"warn\"\n");
    std::env::set_var("SHARDROUTE__LOG_LEVEL", "debug");
    let config = Config::load(Some(file.path()));
    std::env::remove_var("SHARDROUTE__LOG_LEVEL");

    assert_eq!(config.unwrap().log_level, "debug");
}
