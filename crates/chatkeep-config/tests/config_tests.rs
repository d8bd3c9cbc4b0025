// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for configuration loading and diagnostics.

use std::io::Write;

use chatkeep_config::diagnostic::ConfigError;
use chatkeep_config::model::ChatkeepConfig;
use chatkeep_config::{
    load_and_validate_path, load_and_validate_str, load_config_from_path, load_config_from_str,
};
use serial_test::serial;

#[test]
fn full_file_deserializes() {
    let toml = r#"
[app]
log_level = "debug"

[storage]
database_path = "/tmp/chatkeep-test.db"
legacy_dir = "/tmp/legacy"
wal_mode = false
busy_timeout_ms = 250
tombstone_retention_days = 7

[locks]
ttl_ms = 4000
heartbeat_ms = 1000
event_capacity = 16
event_poll_ms = 250
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.app.log_level, "debug");
    assert_eq!(config.storage.database_path, "/tmp/chatkeep-test.db");
    assert_eq!(config.storage.legacy_dir.as_deref(), Some("/tmp/legacy"));
    assert!(!config.storage.wal_mode);
    assert_eq!(config.storage.busy_timeout_ms, 250);
    assert_eq!(config.storage.tombstone_retention_days, 7);
    assert_eq!(config.locks.ttl_ms, 4_000);
    assert_eq!(config.locks.heartbeat_ms, 1_000);
    assert_eq!(config.locks.event_capacity, 16);
    assert_eq!(config.locks.event_poll_ms, 250);
}

#[test]
fn empty_file_uses_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");
    assert_eq!(config, ChatkeepConfig::default());
    assert_eq!(config.app.log_level, "info");
    assert!(config.storage.database_path.ends_with("chatkeep.db"));
    assert!(config.storage.legacy_dir.is_none());
    assert!(config.storage.wal_mode);
    assert_eq!(config.storage.busy_timeout_ms, 5_000);
    assert_eq!(config.storage.tombstone_retention_days, 30);
    assert_eq!(config.locks.ttl_ms, 30_000);
    assert_eq!(config.locks.heartbeat_ms, 10_000);
    assert_eq!(config.locks.event_capacity, 64);
    assert_eq!(config.locks.event_poll_ms, 500);
}

#[test]
fn unknown_section_is_rejected() {
    let err = load_config_from_str("[logging]\nlevel = \"debug\"\n")
        .expect_err("unknown top-level section should be rejected");
    let msg = err.to_string();
    assert!(
        msg.contains("unknown field") || msg.contains("logging"),
        "got: {msg}"
    );
}

#[test]
fn dotted_override_wins_over_file() {
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };

    let config: ChatkeepConfig = Figment::new()
        .merge(Serialized::defaults(ChatkeepConfig::default()))
        .merge(Toml::string("[storage]\nbusy_timeout_ms = 100\n"))
        .merge(("storage.busy_timeout_ms", 900))
        .extract()
        .expect("override should merge");
    assert_eq!(config.storage.busy_timeout_ms, 900);
}

#[test]
#[serial]
fn env_vars_override_file_values() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[locks]\nttl_ms = 8000\nheartbeat_ms = 2000").unwrap();

    // SAFETY: serialized with every other test touching the environment.
    unsafe {
        std::env::set_var("CHATKEEP_LOCKS_HEARTBEAT_MS", "3000");
        std::env::set_var("CHATKEEP_STORAGE_TOMBSTONE_RETENTION_DAYS", "9");
    }
    let config = load_config_from_path(file.path());
    unsafe {
        std::env::remove_var("CHATKEEP_LOCKS_HEARTBEAT_MS");
        std::env::remove_var("CHATKEEP_STORAGE_TOMBSTONE_RETENTION_DAYS");
    }

    let config = config.expect("file plus env should load");
    assert_eq!(config.locks.ttl_ms, 8_000);
    assert_eq!(config.locks.heartbeat_ms, 3_000);
    assert_eq!(config.storage.tombstone_retention_days, 9);
}

#[test]
#[serial]
fn unknown_key_in_file_is_reported() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "[locks]\nttl_ms = 8000\nheartbeat_sm = 2000\n").unwrap();

    let errors = load_and_validate_path(file.path()).expect_err("typo should fail");
    let found = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, .. }
            if key == "heartbeat_sm" && suggestion.as_deref() == Some("heartbeat_ms"))
    });
    assert!(found, "got: {errors:?}");
}

#[test]
fn unknown_key_suggests_and_lists_valid_keys() {
    let errors = load_and_validate_str("[storage]\nwal_mod = true\n").expect_err("should fail");
    let found = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, .. }
            if key == "wal_mod"
                && suggestion.as_deref() == Some("wal_mode")
                && valid_keys.contains("busy_timeout_ms")
                && valid_keys.contains("legacy_dir"))
    });
    assert!(found, "got: {errors:?}");
}

#[test]
fn wrong_type_is_reported() {
    let errors =
        load_and_validate_str("[locks]\nttl_ms = \"long\"\n").expect_err("should reject type");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { key, .. } if key.contains("ttl_ms"))),
        "got: {errors:?}"
    );
}

#[test]
fn validation_runs_after_parsing() {
    let errors = load_and_validate_str("[locks]\nttl_ms = 1000\nheartbeat_ms = 5000\n")
        .expect_err("heartbeat slower than ttl should fail");
    assert!(matches!(errors[0], ConfigError::Validation { .. }));
}

#[test]
fn diagnostics_render_with_codes() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "ttl".into(),
        suggestion: Some("ttl_ms".into()),
        valid_keys: "ttl_ms, heartbeat_ms, event_capacity".into(),
        span: None,
        src: None,
    };
    assert_eq!(
        error.code().map(|c| c.to_string()).as_deref(),
        Some("chatkeep::config::unknown_key")
    );
    assert!(error.help().unwrap().to_string().contains("did you mean `ttl_ms`"));

    let mut out = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut out, &error)
        .unwrap();
    assert!(out.contains("ttl"));
}
