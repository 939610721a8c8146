//! Tests for the 'validate' command
//!
//! The validate command loads the config file, merges overrides and builds
//! every target without contacting the server.

use mariadb_backup::config::{load_config, resolve_settings, Overrides};
use mariadb_backup::managers::timer::TimerOptions;
use std::fs;
use test_utils::{ConfigBuilder, ResultAssertions, TestContext};

#[test]
fn test_validate_valid_config() {
    let builder = ConfigBuilder::minimal()
        .add_target("archive", "s3://bucket/db")
        .add_target("nas", "smb://user:pw@nas.local/backups");
    let (config, temp_dir) = builder.persist();

    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, toml::to_string_pretty(&config).unwrap()).unwrap();

    let loaded = load_config(&config_path).assert_ok_msg("Valid config should pass validation");
    assert_eq!(loaded.targets.len(), 3);

    let settings = resolve_settings(&Overrides::default(), Some(&loaded)).unwrap();
    let targets = settings.build_targets().unwrap();
    let urls: Vec<&str> = targets.iter().map(|t| t.url()).collect();
    // Every defined target, sorted by name
    assert_eq!(urls[0], "s3://bucket/db");
    assert!(urls[1].starts_with("file://"));
    assert_eq!(urls[2], "smb://nas.local/backups");
}

#[test]
fn test_validate_empty_config() {
    let ctx = TestContext::new();
    let config_path = ctx.create_file("config.toml", "");

    let config = load_config(&config_path).unwrap();
    let settings = resolve_settings(&Overrides::default(), Some(&config)).unwrap();
    assert!(settings.targets.is_empty());
}

#[test]
fn test_validate_unknown_key_is_ignored() {
    let ctx = TestContext::new();
    let config_path = ctx.create_file(
        "config.toml",
        "[database]\nserver = \"db\"\nflavour = \"mariadb\"\n",
    );

    let config = load_config(&config_path).unwrap();
    assert_eq!(config.database.server.as_deref(), Some("db"));
}

#[test]
fn test_validate_wrong_type() {
    let ctx = TestContext::new();
    let config_path = ctx.create_file("config.toml", "[database]\nport = \"not-a-port\"\n");

    load_config(&config_path).assert_err_contains("Failed to parse");
}

#[test]
fn test_validate_conflicting_command_line_timer() {
    let overrides = Overrides {
        timer: TimerOptions {
            once: true,
            cron: Some("0 * * * *".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    resolve_settings(&overrides, None).assert_err_contains("conflicting timer options");
}

#[test]
fn test_validate_invalid_begin() {
    let overrides = Overrides {
        timer: TimerOptions {
            begin: Some("25:00".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    resolve_settings(&overrides, None).assert_err_contains("invalid begin");
}

#[test]
fn test_validate_invalid_command_line_target() {
    let overrides = Overrides {
        targets: vec!["relative/path".to_string()],
        ..Default::default()
    };

    resolve_settings(&overrides, None).assert_err_contains("relative/path");
}
