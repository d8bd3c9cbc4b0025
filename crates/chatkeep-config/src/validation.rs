// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.

use crate::diagnostic::ConfigError;
use crate::model::ChatkeepConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration, collecting every problem found.
pub fn validate_config(config: &ChatkeepConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    let level = config.app.log_level.trim().to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        fail(format!(
            "app.log_level `{}` must be one of: {}",
            config.app.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if let Some(dir) = &config.storage.legacy_dir
        && dir.trim().is_empty()
    {
        fail("storage.legacy_dir must not be empty when set".to_string());
    }

    if config.storage.tombstone_retention_days == 0 {
        fail("storage.tombstone_retention_days must be at least 1".to_string());
    }

    let locks = &config.locks;
    if locks.ttl_ms == 0 {
        fail("locks.ttl_ms must be greater than 0".to_string());
    } else if i64::try_from(locks.ttl_ms).is_err() {
        fail(format!("locks.ttl_ms must be at most {}", i64::MAX));
    }
    if locks.heartbeat_ms == 0 {
        fail("locks.heartbeat_ms must be greater than 0".to_string());
    } else if locks.heartbeat_ms >= locks.ttl_ms {
        fail(format!(
            "locks.heartbeat_ms ({}) must be less than locks.ttl_ms ({})",
            locks.heartbeat_ms, locks.ttl_ms
        ));
    }
    if locks.event_capacity == 0 {
        fail("locks.event_capacity must be greater than 0".to_string());
    }
    if locks.event_poll_ms == 0 {
        fail("locks.event_poll_ms must be greater than 0".to_string());
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&ChatkeepConfig::default()).is_ok());
    }

    #[test]
    fn heartbeat_must_beat_ttl() {
        let mut config = ChatkeepConfig::default();
        config.locks.heartbeat_ms = config.locks.ttl_ms;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("heartbeat_ms"));
    }

    #[test]
    fn ttl_must_fit_a_signed_millisecond_count() {
        let mut config = ChatkeepConfig::default();
        config.locks.ttl_ms = i64::MAX as u64;
        assert!(validate_config(&config).is_ok());

        config.locks.ttl_ms = u64::MAX;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("locks.ttl_ms must be at most"));
    }

    #[test]
    fn collects_every_failure() {
        let mut config = ChatkeepConfig::default();
        config.app.log_level = "loud".into();
        config.storage.database_path = "  ".into();
        config.locks.event_capacity = 0;
        config.locks.event_poll_ms = 0;
        assert_eq!(validate_config(&config).unwrap_err().len(), 4);
    }
}
