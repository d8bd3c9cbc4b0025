// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model.
//!
//! Every section rejects unknown keys so typos surface at startup instead of
//! being silently ignored.

use serde::{Deserialize, Serialize};

/// Top-level configuration. All sections are optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChatkeepConfig {
    #[serde(default)]
    pub app: AppConfig,

    /// Where conversations are persisted.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Per-tab conversation locks.
    #[serde(default)]
    pub locks: LocksConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// SQLite store settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file shared by all tabs.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Directory holding legacy flat key files to migrate from on first load.
    #[serde(default)]
    pub legacy_dir: Option<String>,

    /// Enable WAL journaling.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// How long a writer waits for another tab's write to finish.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Days a deletion tombstone keeps stale saves from resurrecting a conversation.
    #[serde(default = "default_tombstone_retention_days")]
    pub tombstone_retention_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            legacy_dir: None,
            wal_mode: default_wal_mode(),
            busy_timeout_ms: default_busy_timeout_ms(),
            tombstone_retention_days: default_tombstone_retention_days(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|d| d.join("chatkeep").join("chatkeep.db"))
        .unwrap_or_else(|| "chatkeep.db".into())
        .display()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_tombstone_retention_days() -> u32 {
    30
}

/// Lock timing. A lock not refreshed within `ttl_ms` is treated as released.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LocksConfig {
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// Refresh period for held locks; must be shorter than `ttl_ms`.
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,

    /// Events buffered per slow subscriber.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// How often a tab checks the shared database for other processes' lock events.
    #[serde(default = "default_event_poll_ms")]
    pub event_poll_ms: u64,
}

impl Default for LocksConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
            heartbeat_ms: default_heartbeat_ms(),
            event_capacity: default_event_capacity(),
            event_poll_ms: default_event_poll_ms(),
        }
    }
}

fn default_ttl_ms() -> u64 {
    30_000
}

fn default_heartbeat_ms() -> u64 {
    10_000
}

fn default_event_capacity() -> usize {
    64
}

fn default_event_poll_ms() -> u64 {
    500
}
