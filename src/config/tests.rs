use super::*;
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

#[test]
#[serial]
fn config_dir_is_under_home() {
    let config_dir = get_config_dir().expect("should resolve config dir");
    assert!(config_dir.ends_with(".transcript-router"));
}

#[test]
fn invalid_toml_handling() {
    let invalid_toml = r#"
        [routing
        direct_cache_max_minutes = "thirty"
    "#;

    let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
    assert!(result.is_err());
}

#[test]
fn wrong_value_type_is_rejected() {
    let result: Result<Config, toml::de::Error> =
        toml::from_str("[cache]\nmin_tokens = \"lots\"\n");
    assert!(result.is_err());
}

#[test]
fn empty_file_is_all_defaults() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    fs::write(temp_dir.path().join("config.toml"), "").expect("should write config file");

    let config = Config::load(temp_dir.path()).expect("should load empty config");
    assert_eq!(
        config,
        Config {
            base_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        }
    );
}

#[test]
fn error_display_messages() {
    let errors = vec![
        ConfigError::InvalidThresholds(0, 180),
        ConfigError::InvalidBudget("smart-rag", 0),
        ConfigError::InvalidTtl("direct", 0, 86_400),
        ConfigError::InvalidPrice("input", -1.0),
        ConfigError::DirectoryError,
    ];

    for error in errors {
        let message = format!("{error}");
        assert!(message.len() > 10);
    }
}
