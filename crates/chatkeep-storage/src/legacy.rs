// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Legacy flat key storage, read once for migration.
//!
//! Older installs kept the conversation blob and the current id as two
//! unscoped string keys. The file-backed store maps each key to a file of
//! the same name inside one directory.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chatkeep_core::ChatkeepError;

pub const LEGACY_CHATS_KEY: &str = "bs2_chat_history";
pub const LEGACY_CURRENT_ID_KEY: &str = "bs2_current_chat_id";

/// A flat string key/value store that predates the database.
#[async_trait]
pub trait LegacyStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>, ChatkeepError>;

    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), ChatkeepError>;
}

#[derive(Debug, Clone)]
pub struct FileLegacyStore {
    dir: PathBuf,
}

impl FileLegacyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl LegacyStore for FileLegacyStore {
    async fn read(&self, key: &str) -> Result<Option<String>, ChatkeepError> {
        match tokio::fs::read_to_string(self.dir.join(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ChatkeepError::storage(e)),
        }
    }

    async fn remove(&self, key: &str) -> Result<(), ChatkeepError> {
        match tokio::fs::remove_file(self.dir.join(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ChatkeepError::storage(e)),
        }
    }
}

/// In-memory legacy store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryLegacyStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryLegacyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: &str) -> Self {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }
}

#[async_trait]
impl LegacyStore for MemoryLegacyStore {
    async fn read(&self, key: &str) -> Result<Option<String>, ChatkeepError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| ChatkeepError::Internal("legacy store mutex poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<(), ChatkeepError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ChatkeepError::Internal("legacy store mutex poisoned".into()))?;
        entries.remove(key);
        Ok(())
    }
}
