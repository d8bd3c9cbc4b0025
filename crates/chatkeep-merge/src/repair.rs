// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Schema normalization for raw persisted conversation records.
//!
//! Input is whatever JSON came out of storage or an archive. Output is a
//! typed, de-duplicated set with canonical timestamps:
//!
//! - Conversation ids that are missing, non-string or already taken are
//!   re-minted, and the old id is recorded in `id_map`.
//! - Message ids are checked for collisions across the whole set.
//! - A conversation without a usable timestamp gets one derived from its
//!   array position, so earlier entries stay earlier. A message without one
//!   gets its conversation's timestamp plus its index.
//! - Conversations come out newest first (ties by id); messages oldest first
//!   (ties by id).

use std::collections::{BTreeMap, HashSet};

use chatkeep_core::time::{SECONDS_THRESHOLD, parse_timestamp_ms};
use chatkeep_core::{
    Clock, Conversation, DEFAULT_TITLE, Message, Protection, RepairStats, Role, create_id,
    iso_from_ms,
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

const CHAT_FIELDS: &[&str] = &[
    "id",
    "title",
    "isTitleManuallyEdited",
    "titleRevision",
    "messages",
    "createdAt",
    "createdAtMs",
    "mode",
    "protection",
];

const MESSAGE_FIELDS: &[&str] = &[
    "id",
    "role",
    "content",
    "reasoning_content",
    "createdAt",
    "createdAtMs",
    "revision",
];

/// Fields tried, in order, for a conversation's creation time. The id is
/// last because legacy clients minted ids from the wall clock.
const CHAT_TIMESTAMP_FIELDS: &[&str] =
    &["createdAtMs", "createdAt", "timestamp", "created_at", "id"];

/// Result of a repair pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairOutcome {
    /// Newest first.
    pub chats: Vec<Conversation>,
    /// Old conversation id to the id that replaced it.
    pub id_map: BTreeMap<String, String>,
    /// Whether anything was rewritten or reordered.
    pub changed: bool,
    pub stats: RepairStats,
}

impl RepairOutcome {
    /// Where a saved current-conversation pointer should point after repair.
    ///
    /// Follows `id_map`, and falls back to the newest conversation when the
    /// pointer is missing or no longer names a conversation in the set.
    pub fn resolve_current_id(&self, saved: Option<&str>) -> Option<String> {
        resolve_current_id(&self.chats, &self.id_map, saved)
    }
}

/// See [`RepairOutcome::resolve_current_id`].
pub fn resolve_current_id(
    chats: &[Conversation],
    id_map: &BTreeMap<String, String>,
    saved: Option<&str>,
) -> Option<String> {
    let mapped = saved
        .filter(|id| !id.is_empty())
        .map(|id| id_map.get(id).map_or(id, String::as_str));
    match mapped {
        Some(id) if chats.iter().any(|c| c.id == id) => Some(id.to_string()),
        _ => chats.first().map(|c| c.id.clone()),
    }
}

/// Normalize a raw conversation array.
pub fn repair_conversations(raw: &[Value], clock: &dyn Clock) -> RepairOutcome {
    let now = clock.now_ms();
    let total = raw.len();
    let mut chat_ids = HashSet::new();
    let mut message_ids = HashSet::new();
    let mut id_map = BTreeMap::new();
    let mut stats = RepairStats {
        total_chats: total,
        ..RepairStats::default()
    };
    let empty = Map::new();

    let mut chats = Vec::with_capacity(total);
    for (index, value) in raw.iter().enumerate() {
        let object = value.as_object().unwrap_or(&empty);
        let fallback_ms = now - (total - index).max(1) as i64;
        let created_at_ms = CHAT_TIMESTAMP_FIELDS
            .iter()
            .find_map(|field| object.get(*field).and_then(stable_timestamp_ms))
            .unwrap_or(fallback_ms);

        let id = match object.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() && !chat_ids.contains(id) => id.to_string(),
            _ => create_id(),
        };
        chat_ids.insert(id.clone());
        if let Some(old) = object.get("id").filter(|v| !v.is_null()) {
            let old = match old {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if old != id {
                id_map.insert(old, id.clone());
            }
        }

        let raw_messages = object
            .get("messages")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let mut messages = Vec::with_capacity(raw_messages.len());
        for (msg_index, raw_msg) in raw_messages.iter().enumerate() {
            let fallback = created_at_ms + msg_index as i64;
            let msg = repair_message(raw_msg, fallback, &mut message_ids);
            if !same_record(&msg, raw_msg) {
                stats.repaired_message_count += 1;
            }
            messages.push(msg);
        }
        messages.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });

        let chat = Conversation {
            id,
            title: object
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_TITLE)
                .to_string(),
            is_title_manually_edited: object
                .get("isTitleManuallyEdited")
                .and_then(Value::as_bool),
            title_revision: revision(object, "titleRevision"),
            messages,
            created_at: iso_from_ms(created_at_ms),
            created_at_ms,
            mode: object.get("mode").and_then(Value::as_str).map(str::to_string),
            protection: object.get("protection").and_then(parse_protection),
            extra: extra_fields(object, CHAT_FIELDS),
        };
        if !same_record(&chat, value) {
            stats.repaired_chat_count += 1;
        }
        chats.push(chat);
    }

    // a duplicate's id stays with its first holder
    id_map.retain(|old, _| !chat_ids.contains(old));

    let input_order: Vec<String> = chats.iter().map(|c| c.id.clone()).collect();
    chats.sort_by(|a, b| {
        b.created_at_ms
            .cmp(&a.created_at_ms)
            .then_with(|| a.id.cmp(&b.id))
    });
    let reordered = chats.iter().map(|c| &c.id).ne(input_order.iter());

    let changed = stats.repaired_chat_count > 0 || reordered;
    if changed {
        debug!(
            total_chats = stats.total_chats,
            repaired_chats = stats.repaired_chat_count,
            repaired_messages = stats.repaired_message_count,
            remapped_ids = id_map.len(),
            reordered,
            "repaired conversation set"
        );
    }

    RepairOutcome {
        chats,
        id_map,
        changed,
        stats,
    }
}

/// Repair an already typed set, e.g. one assembled in memory from several
/// sources.
pub fn repair_typed(chats: &[Conversation], clock: &dyn Clock) -> RepairOutcome {
    let raw: Vec<Value> = chats
        .iter()
        .map(|c| serde_json::to_value(c).unwrap_or(Value::Null))
        .collect();
    repair_conversations(&raw, clock)
}

fn repair_message(raw: &Value, fallback_ms: i64, seen: &mut HashSet<String>) -> Message {
    let empty = Map::new();
    let object = raw.as_object().unwrap_or(&empty);

    let created_at_ms = object
        .get("createdAtMs")
        .and_then(stable_timestamp_ms)
        .or_else(|| object.get("createdAt").and_then(stable_timestamp_ms))
        .unwrap_or(fallback_ms);

    let id = match object.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() && !seen.contains(id) => id.to_string(),
        _ => create_id(),
    };
    seen.insert(id.clone());

    let role = object
        .get("role")
        .and_then(Value::as_str)
        .and_then(|r| r.parse::<Role>().ok())
        .unwrap_or(Role::Assistant);

    let content = match object.get("content") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    Message {
        id,
        role,
        content,
        reasoning_content: object
            .get("reasoning_content")
            .and_then(Value::as_str)
            .map(str::to_string),
        created_at: iso_from_ms(created_at_ms),
        created_at_ms,
        revision: revision(object, "revision"),
        extra: extra_fields(object, MESSAGE_FIELDS),
    }
}

fn revision(object: &Map<String, Value>, field: &str) -> u64 {
    object.get(field).and_then(Value::as_u64).unwrap_or(0)
}

/// Parsed timestamp, rejected when it would read back as epoch seconds.
fn stable_timestamp_ms(value: &Value) -> Option<i64> {
    parse_timestamp_ms(value).filter(|ms| *ms as f64 >= SECONDS_THRESHOLD)
}

fn parse_protection(value: &Value) -> Option<Protection> {
    if value.is_null() {
        return None;
    }
    match serde_json::from_value::<Protection>(value.clone()) {
        Ok(protection) => Some(protection),
        Err(e) => {
            warn!(error = %e, "dropping malformed protection record");
            None
        }
    }
}

fn extra_fields(object: &Map<String, Value>, known: &[&str]) -> Map<String, Value> {
    object
        .iter()
        .filter(|(key, _)| !known.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Whether the typed record serializes back to exactly the raw input.
fn same_record<T: serde::Serialize>(typed: &T, raw: &Value) -> bool {
    serde_json::to_value(typed).is_ok_and(|v| &v == raw)
}
