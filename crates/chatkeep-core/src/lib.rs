// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for chatkeep.
//!
//! Provides the persisted record schema, the error type, identifier and
//! timestamp utilities, and the backend traits every other crate in the
//! workspace builds on.

pub mod error;
pub mod ids;
pub mod time;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ChatkeepError;
pub use ids::create_id;
pub use time::{Clock, ManualClock, SystemClock, iso_from_ms, parse_timestamp_ms};
pub use traits::{LockBackend, StorageAdapter};
pub use types::{
    Conversation, DEFAULT_TITLE, HealthStatus, LoadSource, LoadedState, LockEvent,
    LockEventKind, LockRecord, LockTable, Message, Protection, RepairStats, Role, SaveReport,
    SaveRequest, TabId,
};
