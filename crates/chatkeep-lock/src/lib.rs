// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tab-scoped advisory locks for chatkeep.
//!
//! A [`LockManager`] is built once per tab and owns that tab's identity. It
//! talks to a shared [`LockBackend`](chatkeep_core::LockBackend) holding the
//! lock table and announces changes on a [`LockEventBus`]. Locks warn other
//! tabs off a conversation; they never block writes.

pub mod bus;
pub mod heartbeat;
pub mod manager;
pub mod memory;

pub use bus::LockEventBus;
pub use heartbeat::{Heartbeat, HeartbeatStatus};
pub use manager::{LockAcquisition, LockManager, LockSettings, is_active};
pub use memory::MemoryLockBackend;
