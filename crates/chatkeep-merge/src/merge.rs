// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content-aware reconciliation of conversation sets.
//!
//! Every conflict is settled by picking a maximum under a fixed total order
//! (or by a left/right bias that is itself associative), so the outcome does
//! not depend on the order in which tabs happen to merge the same inputs.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use chatkeep_core::{Conversation, DEFAULT_TITLE, Message};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::title::{generate_branch_title, is_manual_title};

/// How conversations present on only the incoming side are treated.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MergePolicy {
    /// Another tab's write: incoming-only conversations are kept verbatim.
    #[default]
    Sync,
    /// An archive import: incoming-only conversations get a collision-safe title.
    Import,
}

/// Result of merging two conversation sets.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Newest first, ties by id.
    pub conversations: Vec<Conversation>,
    /// Conversations that existed only on the incoming side.
    pub added: usize,
    /// Conversations present on both sides.
    pub merged: usize,
}

/// Rank used to settle a duplicate message. Higher wins.
fn message_precedence(a: &Message, b: &Message) -> Ordering {
    a.created_at_ms
        .cmp(&b.created_at_ms)
        .then_with(|| a.revision.cmp(&b.revision))
        .then_with(|| a.payload_len().cmp(&b.payload_len()))
        .then_with(|| a.content.cmp(&b.content))
        .then_with(|| a.reasoning_content.cmp(&b.reasoning_content))
        .then_with(|| canonical_json(a).cmp(&canonical_json(b)))
}

fn canonical_json(message: &Message) -> String {
    serde_json::to_string(message).unwrap_or_default()
}

fn keep_better(slot: &mut Message, candidate: &Message) {
    // equal precedence means equal records, so the incoming copy is as good
    if message_precedence(candidate, slot) != Ordering::Less {
        *slot = candidate.clone();
    }
}

fn sort_messages(messages: &mut [Message]) {
    messages.sort_by(|a, b| {
        a.created_at_ms
            .cmp(&b.created_at_ms)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Union two message lists keyed by id.
///
/// A message on both sides resolves to the later one, then the more edited
/// one, then the longer one (content plus reasoning), then a fixed order over
/// the remaining fields.
/// The result is sorted by timestamp, ties by id, and is the same whichever
/// side is passed first.
pub fn merge_messages(existing: &[Message], incoming: &[Message]) -> Vec<Message> {
    let mut by_id: HashMap<&str, Message> = HashMap::with_capacity(existing.len() + incoming.len());
    for message in existing.iter().chain(incoming) {
        match by_id.get_mut(message.id.as_str()) {
            Some(slot) => keep_better(slot, message),
            None => {
                by_id.insert(message.id.as_str(), message.clone());
            }
        }
    }
    let mut merged: Vec<Message> = by_id.into_values().collect();
    sort_messages(&mut merged);
    merged
}

/// Rank of a title when resolving a conflict. Higher wins, ties go to the
/// existing side.
fn title_rank(chat: &Conversation, manual: bool) -> u8 {
    let title = chat.title.trim();
    if manual {
        3
    } else if !title.is_empty() && title != DEFAULT_TITLE {
        2
    } else if !title.is_empty() {
        1
    } else {
        0
    }
}

/// Merge one conversation present on both sides.
///
/// Messages are unioned, the title resolved by rank and then by rename
/// revision, the earlier creation
/// time kept. `mode` keeps the existing value unless it has none;
/// `protection` is last-write-wins from the incoming side.
pub fn merge_conversation(existing: &Conversation, incoming: &Conversation) -> Conversation {
    let existing_manual = is_manual_title(existing);
    let incoming_manual = is_manual_title(incoming);

    let incoming_key = (title_rank(incoming, incoming_manual), incoming.title_revision);
    let existing_key = (title_rank(existing, existing_manual), existing.title_revision);
    let title_source = if incoming_key > existing_key {
        incoming
    } else {
        existing
    };

    let (created_at, created_at_ms) = if incoming.created_at_ms < existing.created_at_ms {
        (incoming.created_at.clone(), incoming.created_at_ms)
    } else {
        (existing.created_at.clone(), existing.created_at_ms)
    };

    let mut extra = existing.extra.clone();
    extra.extend(incoming.extra.iter().map(|(k, v)| (k.clone(), v.clone())));

    Conversation {
        id: existing.id.clone(),
        title: title_source.title.clone(),
        is_title_manually_edited: Some(existing_manual || incoming_manual),
        title_revision: title_source.title_revision,
        messages: merge_messages(&existing.messages, &incoming.messages),
        created_at,
        created_at_ms,
        mode: existing.mode.clone().or_else(|| incoming.mode.clone()),
        protection: incoming.protection.clone(),
        extra,
    }
}

/// Order conversations newest first, ties by id.
pub fn sort_conversations(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| {
        b.created_at_ms
            .cmp(&a.created_at_ms)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Merge two conversation sets keyed by id.
///
/// Conversations on one side only are kept; under [`MergePolicy::Import`]
/// incoming-only ones are retitled with [`generate_branch_title`].
/// Conversations on both sides go through [`merge_conversation`].
pub fn merge_conversation_sets(
    existing: Vec<Conversation>,
    incoming: Vec<Conversation>,
    policy: MergePolicy,
) -> MergeOutcome {
    let mut by_id: BTreeMap<String, Conversation> = BTreeMap::new();
    for chat in existing {
        match by_id.get_mut(&chat.id) {
            Some(slot) => *slot = merge_conversation(slot, &chat),
            None => {
                by_id.insert(chat.id.clone(), chat);
            }
        }
    }
    let existing_ids: HashSet<String> = by_id.keys().cloned().collect();

    let mut added = HashSet::new();
    let mut merged = HashSet::new();
    for mut chat in incoming {
        if let Some(slot) = by_id.get_mut(&chat.id) {
            *slot = merge_conversation(slot, &chat);
            if existing_ids.contains(&chat.id) {
                merged.insert(chat.id);
            }
            continue;
        }
        if policy == MergePolicy::Import {
            chat.title = generate_branch_title(&chat.title, false);
        }
        added.insert(chat.id.clone());
        by_id.insert(chat.id.clone(), chat);
    }

    let mut conversations: Vec<Conversation> = by_id.into_values().collect();
    sort_conversations(&mut conversations);
    MergeOutcome {
        conversations,
        added: added.len(),
        merged: merged.len(),
    }
}

/// Drop tombstoned conversations. Returns the survivors and how many were dropped.
pub fn filter_deleted(
    conversations: Vec<Conversation>,
    deleted: &HashSet<String>,
) -> (Vec<Conversation>, usize) {
    let before = conversations.len();
    let kept: Vec<Conversation> = conversations
        .into_iter()
        .filter(|c| !deleted.contains(&c.id))
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

/// Drop tombstoned messages from every conversation. Returns how many were dropped.
pub fn filter_deleted_messages(conversations: &mut [Conversation], deleted: &HashSet<String>) -> usize {
    if deleted.is_empty() {
        return 0;
    }
    conversations
        .iter_mut()
        .map(|chat| {
            let before = chat.messages.len();
            chat.messages.retain(|m| !deleted.contains(&m.id));
            before - chat.messages.len()
        })
        .sum()
}
