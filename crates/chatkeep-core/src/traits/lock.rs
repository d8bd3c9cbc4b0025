// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared lock-table backend.

use async_trait::async_trait;

use crate::error::ChatkeepError;
use crate::types::{LockEvent, LockTable};

/// Holder of the lock table shared by every tab.
///
/// Implementations run each update as one read-modify-write cycle under a
/// mutual-exclusion primitive shared by all tabs, and persist the table only
/// when the closure changed it.
#[async_trait]
pub trait LockBackend: Send + Sync + 'static {
    /// Human-readable backend name, for logs.
    fn name(&self) -> &str;

    /// Apply `f` to the current table atomically with respect to other tabs.
    async fn update<F, R>(&self, f: F) -> Result<R, ChatkeepError>
    where
        F: FnOnce(&mut LockTable) -> R + Send + 'static,
        R: Send + 'static;

    /// Same as [`update`](Self::update) but completes without an async runtime.
    ///
    /// Meant for teardown paths (drop guards, exit hooks) where awaiting is
    /// not possible.
    fn update_blocking<F, R>(&self, f: F) -> Result<R, ChatkeepError>
    where
        F: FnOnce(&mut LockTable) -> R;

    /// Read the current table without modifying it.
    async fn snapshot(&self) -> Result<LockTable, ChatkeepError>;

    /// Record `event` where tabs in other processes can pick it up.
    ///
    /// `origin` names the publishing bus so its own relay can skip it.
    /// Backends shared only within one process keep the default no-op.
    async fn append_event(&self, _event: &LockEvent, _origin: &str) -> Result<(), ChatkeepError> {
        Ok(())
    }

    /// Blocking form of [`append_event`](Self::append_event), for teardown.
    fn append_event_blocking(&self, _event: &LockEvent, _origin: &str) -> Result<(), ChatkeepError> {
        Ok(())
    }
}
