// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend trait definitions.
//!
//! Cross-tab coordination and persistence sit behind these narrow seams so
//! they can be swapped for in-memory stand-ins in single-process tests.

pub mod lock;
pub mod storage;

pub use lock::LockBackend;
pub use storage::StorageAdapter;
