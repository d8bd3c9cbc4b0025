// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading.
//!
//! `./chatkeep.toml` > `~/.config/chatkeep/chatkeep.toml` > `/etc/chatkeep/chatkeep.toml`,
//! with `CHATKEEP_*` environment variables on top.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ChatkeepConfig;

pub(crate) const SYSTEM_CONFIG: &str = "/etc/chatkeep/chatkeep.toml";
pub(crate) const LOCAL_CONFIG: &str = "chatkeep.toml";

pub(crate) fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("chatkeep").join("chatkeep.toml"))
        .unwrap_or_default()
}

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier): compiled defaults, system file,
/// user file, local file, `CHATKEEP_*` variables.
pub fn load_config() -> Result<ChatkeepConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from TOML text over the defaults. No files, no env.
pub fn load_config_from_str(toml_content: &str) -> Result<ChatkeepConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ChatkeepConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from one explicit file plus env overrides.
pub fn load_config_from_path(path: &Path) -> Result<ChatkeepConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ChatkeepConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The full layered figment, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ChatkeepConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Map `CHATKEEP_<SECTION>_<KEY>` onto `section.key`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `CHATKEEP_STORAGE_BUSY_TIMEOUT_MS` lands on `storage.busy_timeout_ms`.
fn env_provider() -> Env {
    Env::prefixed("CHATKEEP_").map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    for section in ["app", "storage", "locks"] {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_on_section_only() {
        assert_eq!(map_env_key("storage_busy_timeout_ms"), "storage.busy_timeout_ms");
        assert_eq!(map_env_key("locks_ttl_ms"), "locks.ttl_ms");
        assert_eq!(map_env_key("app_log_level"), "app.log_level");
        assert_eq!(map_env_key("unrelated"), "unrelated");
    }

    #[test]
    fn user_config_lives_under_chatkeep_dir() {
        let path = user_config_path();
        if !path.as_os_str().is_empty() {
            assert!(path.ends_with("chatkeep/chatkeep.toml"));
        }
    }
}
