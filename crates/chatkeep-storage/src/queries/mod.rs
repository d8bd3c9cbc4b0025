// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed access to the `kv` table and the lock event journal.

pub mod kv;
pub mod lock_events;
