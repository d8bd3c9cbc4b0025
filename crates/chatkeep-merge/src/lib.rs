// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Repair and merge engines for chatkeep conversation sets.
//!
//! - [`repair`] turns raw persisted JSON into a typed, id-consistent set.
//! - [`merge`] reconciles two sets at the message level.
//! - [`title`] produces display-width bounded branch and copy titles.
//! - [`chat_ops`] forks and copies conversations.
//! - [`archive`] reads and writes plain-JSON exports.
//!
//! Everything here is pure: no I/O, and time only through an injected clock.

pub mod archive;
pub mod chat_ops;
pub mod merge;
pub mod repair;
pub mod title;

pub use archive::{Archive, ArchiveScope, ImportMode, build_archive, parse_archive};
pub use chat_ops::{copy_conversation, fork_conversation};
pub use merge::{
    MergeOutcome, MergePolicy, filter_deleted, filter_deleted_messages, merge_conversation,
    merge_conversation_sets, merge_messages,
};
pub use repair::{RepairOutcome, repair_conversations, repair_typed, resolve_current_id};
pub use title::{generate_branch_title, generate_copy_title};
