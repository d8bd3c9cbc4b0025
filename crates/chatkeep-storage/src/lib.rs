// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for chatkeep.
//!
//! All tabs share one database file. The conversation set, per-tab current
//! pointers, deletion tombstones and the lock table live in a single `kv`
//! table; cross-tab atomicity comes from `BEGIN IMMEDIATE` transactions.
//! Lock events are journaled in `lock_events` and replayed by a
//! [`LockEventRelay`] in every other process.

pub mod database;
pub mod events;
pub mod legacy;
pub mod lock_backend;
pub mod migrations;
pub mod queries;
pub mod store;
pub mod writer;

pub use database::Database;
pub use events::LockEventRelay;
pub use legacy::{FileLegacyStore, LegacyStore, MemoryLegacyStore};
pub use lock_backend::SqliteLockBackend;
pub use store::{ChatStore, Tombstones, overwritten_ids};
pub use writer::WriteQueue;
