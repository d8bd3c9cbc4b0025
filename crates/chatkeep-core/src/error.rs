// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for chatkeep.

use thiserror::Error;

/// The primary error type used across chatkeep storage, lock and merge operations.
#[derive(Debug, Error)]
pub enum ChatkeepError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (query failure, quota exhaustion, I/O).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The embedded store could not be opened or is not initialized.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A lock operation was called with an empty conversation id.
    #[error("invalid chat id: lock operations require a non-empty conversation id")]
    InvalidChatId,

    /// No conversation with the given id exists.
    #[error("conversation not found: {0}")]
    NotFound(String),

    /// A persisted or supplied payload could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An archive did not have a recognized shape.
    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatkeepError {
    /// Wraps any error as a storage failure.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            source: Box::new(err),
        }
    }

    /// Short stable identifier of the failure class, used to group repeated
    /// notifications for the same underlying problem.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Storage { .. } => "storage",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::InvalidChatId => "invalid_chat_id",
            Self::NotFound(_) => "not_found",
            Self::Serialization(_) => "serialization",
            Self::InvalidArchive(_) => "invalid_archive",
            Self::Internal(_) => "internal",
        }
    }
}
