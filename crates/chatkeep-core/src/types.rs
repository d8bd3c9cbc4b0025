// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted record schema and common types shared across chatkeep crates.
//!
//! Field names on the wire are camelCase (`createdAtMs`, `isTitleManuallyEdited`)
//! except `reasoning_content`, matching blobs written by earlier clients.
//! Unknown fields are preserved in `extra` so a round trip through this schema
//! never drops data written by a newer client.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use crate::ids::create_id;
use crate::time::iso_from_ms;

/// Title given to conversations that have not been named yet.
pub const DEFAULT_TITLE: &str = "新对话";

fn is_zero(n: &u64) -> bool {
    *n == 0
}

/// Identifier of one tab (one store/lock handle), stable for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub String);

impl TabId {
    /// Mint a fresh random tab identifier.
    pub fn generate() -> Self {
        Self(create_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Author of a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique across the whole store, not just within one conversation.
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(
        default,
        rename = "reasoning_content",
        skip_serializing_if = "Option::is_none"
    )]
    pub reasoning_content: Option<String>,
    pub created_at: String,
    pub created_at_ms: i64,
    /// Bumped by every edit. A copy with a higher revision wins a merge.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub revision: u64,
    /// Fields this schema does not model (UI flags and the like).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// Create a message stamped at `now_ms` with a fresh id.
    pub fn new(role: Role, content: impl Into<String>, now_ms: i64) -> Self {
        Self {
            id: create_id(),
            role,
            content: content.into(),
            reasoning_content: None,
            created_at: iso_from_ms(now_ms),
            created_at_ms: now_ms,
            revision: 0,
            extra: Map::new(),
        }
    }

    /// Replace the content, bumping the revision when it changes.
    pub fn edit(&mut self, content: impl Into<String>) {
        let content = content.into();
        if self.content != content {
            self.content = content;
            self.revision += 1;
        }
    }

    /// Combined length of content and reasoning, in characters.
    pub fn payload_len(&self) -> usize {
        self.content.chars().count()
            + self
                .reasoning_content
                .as_deref()
                .map_or(0, |r| r.chars().count())
    }
}

/// Password proof gating UI access to a conversation.
///
/// Opaque to storage: it is carried through repair and merge untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Protection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A titled, ordered sequence of messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// `None` for records written before the flag existed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_title_manually_edited: Option<bool>,
    /// Bumped by every rename.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub title_revision: u64,
    /// Chronological order: `created_at_ms` ascending, ties by id.
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: String,
    pub created_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection: Option<Protection>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Conversation {
    /// Create an empty conversation stamped at `now_ms` with a fresh id.
    pub fn new(title: impl Into<String>, mode: Option<String>, now_ms: i64) -> Self {
        Self {
            id: create_id(),
            title: title.into(),
            is_title_manually_edited: Some(false),
            title_revision: 0,
            messages: Vec::new(),
            created_at: iso_from_ms(now_ms),
            created_at_ms: now_ms,
            mode,
            protection: None,
            extra: Map::new(),
        }
    }

    /// Rename the conversation, flagging the title as user-chosen when it changes.
    pub fn rename(&mut self, title: impl Into<String>) {
        let title = title.into();
        if self.title != title {
            self.title = title;
            self.is_title_manually_edited = Some(true);
            self.title_revision += 1;
        }
    }

    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }

    /// Remove a message by id, returning it.
    pub fn remove_message(&mut self, message_id: &str) -> Option<Message> {
        let index = self.messages.iter().position(|m| m.id == message_id)?;
        Some(self.messages.remove(index))
    }

    pub fn is_protected(&self) -> bool {
        self.protection.as_ref().is_some_and(|p| p.enabled)
    }
}

/// One tab's advisory claim on a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub chat_id: String,
    #[serde(default)]
    pub chat_title: String,
    pub tab_id: TabId,
    /// Epoch milliseconds of the last acquire or heartbeat.
    #[serde(default)]
    pub updated_at: i64,
}

/// Shared lock table keyed by conversation id.
pub type LockTable = BTreeMap<String, LockRecord>;

/// Kind of lock state change broadcast to other tabs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LockEventKind {
    LockUpdated,
    LockReleased,
    LockReleaseAll,
}

/// Lock state change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockEvent {
    #[serde(rename = "type")]
    pub kind: LockEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    pub tab_id: TabId,
    pub at: i64,
}

/// Where the state returned by a load came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum LoadSource {
    /// Read from the embedded store.
    Embedded,
    /// Moved from legacy flat storage during this load.
    MigratedFromLegacy,
    /// Nothing stored, or the store was unreadable.
    Empty,
}

/// Counts reported by the repair pass. Diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairStats {
    pub total_chats: usize,
    pub repaired_chat_count: usize,
    pub repaired_message_count: usize,
}

/// Result of loading a tab's view of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedState {
    /// Newest first.
    pub conversations: Vec<Conversation>,
    pub current_id: Option<String>,
    pub source: LoadSource,
    /// Present when the load had to repair persisted data.
    pub repair: Option<RepairStats>,
}

impl LoadedState {
    pub fn empty() -> Self {
        Self {
            conversations: Vec::new(),
            current_id: None,
            source: LoadSource::Empty,
            repair: None,
        }
    }
}

/// A tab's proposed conversation set plus bookkeeping for the write path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveRequest {
    pub conversations: Vec<Conversation>,
    pub current_id: Option<String>,
    /// Conversations explicitly deleted in this tab.
    pub deleted_ids: Vec<String>,
    /// Previously deleted ids that an explicit import brings back.
    pub revived_ids: Vec<String>,
    /// Messages explicitly deleted in this tab.
    pub deleted_message_ids: Vec<String>,
    /// Previously deleted message ids that an explicit import brings back.
    pub revived_message_ids: Vec<String>,
}

impl SaveRequest {
    pub fn new(conversations: Vec<Conversation>) -> Self {
        Self {
            conversations,
            ..Self::default()
        }
    }

    pub fn with_current_id(mut self, id: Option<String>) -> Self {
        self.current_id = id;
        self
    }

    pub fn with_deleted_ids(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.deleted_ids = ids.into_iter().collect();
        self
    }

    pub fn with_revived_ids(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.revived_ids = ids.into_iter().collect();
        self
    }

    pub fn with_deleted_message_ids(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.deleted_message_ids = ids.into_iter().collect();
        self
    }

    pub fn with_revived_message_ids(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.revived_message_ids = ids.into_iter().collect();
        self
    }
}

/// Outcome of a successful save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveReport {
    /// Whether the persisted blob differs from what was there before.
    pub changed: bool,
    /// Conversations in the persisted set after the merge.
    pub conversation_count: usize,
    /// Conversations dropped because they are tombstoned.
    pub suppressed_deleted: usize,
    /// Messages dropped because they are tombstoned.
    pub suppressed_messages: usize,
}

/// Health status reported by storage health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Fully operational.
    Healthy,
    /// Operational but experiencing issues.
    Degraded(String),
    /// Not operational.
    Unhealthy(String),
}
