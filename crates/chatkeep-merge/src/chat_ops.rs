// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fork and copy of conversations.

use chatkeep_core::{Conversation, Message, create_id};

use crate::title::{generate_branch_title, generate_copy_title};

/// Clone messages, giving each a fresh id so the copies never collide with
/// the originals. Timestamps and content are kept.
pub fn clone_messages_with_new_ids(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .map(|m| Message {
            id: create_id(),
            ..m.clone()
        })
        .collect()
}

/// New conversation holding `source`'s messages up to and including
/// `upto_index`, titled as a branch of `source`.
///
/// An index past the end keeps every message. Mode and protection carry
/// over; the copy is stamped at `now_ms`.
pub fn fork_conversation(source: &Conversation, upto_index: usize, now_ms: i64) -> Conversation {
    let keep = upto_index.saturating_add(1).min(source.messages.len());
    let mut fork = Conversation::new(
        generate_branch_title(&source.title, true),
        source.mode.clone(),
        now_ms,
    );
    fork.messages = clone_messages_with_new_ids(&source.messages[..keep]);
    if source.is_protected() {
        fork.protection = source.protection.clone();
    }
    fork
}

/// Full copy of `source` under a copy-suffixed title, stamped at `now_ms`.
pub fn copy_conversation(source: &Conversation, now_ms: i64) -> Conversation {
    let mut copy = Conversation::new(generate_copy_title(&source.title), source.mode.clone(), now_ms);
    copy.messages = clone_messages_with_new_ids(&source.messages);
    copy
}
