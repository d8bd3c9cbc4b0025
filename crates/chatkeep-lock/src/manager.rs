// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Advisory per-conversation locks scoped to a tab.
//!
//! Every mutation is one read-modify-write of the shared lock table through
//! the [`LockBackend`], which serializes tabs against each other. Expired
//! entries are evicted at the start of each cycle; nothing expires them in
//! the background, so a crashed tab's locks simply age out.

use std::sync::Arc;
use std::time::Duration;

use chatkeep_core::{
    ChatkeepError, Clock, LockBackend, LockEvent, LockEventKind, LockRecord, LockTable, TabId,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::bus::LockEventBus;

/// Default lifetime of an unrefreshed lock.
pub const DEFAULT_TTL_MS: u64 = 30_000;

/// Default interval between heartbeats.
pub const DEFAULT_HEARTBEAT_MS: u64 = 10_000;

/// Lock timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    /// A lock not refreshed for longer than this is treated as abandoned.
    pub ttl_ms: u64,
    /// How often a held lock is refreshed.
    pub heartbeat_ms: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL_MS,
            heartbeat_ms: DEFAULT_HEARTBEAT_MS,
        }
    }
}

impl LockSettings {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }
}

/// Outcome of [`LockManager::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAcquisition {
    /// This tab now holds the lock.
    Acquired(LockRecord),
    /// Another tab holds a live lock; carries its record for display.
    LockedByOtherTab(LockRecord),
}

impl LockAcquisition {
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired(_))
    }

    pub fn record(&self) -> &LockRecord {
        match self {
            Self::Acquired(record) | Self::LockedByOtherTab(record) => record,
        }
    }
}

/// Whether `record` is still live at `now_ms`.
pub fn is_active(record: &LockRecord, now_ms: i64, ttl_ms: u64) -> bool {
    let ttl_ms = i64::try_from(ttl_ms).unwrap_or(i64::MAX);
    now_ms.saturating_sub(record.updated_at) <= ttl_ms
}

/// Remove expired entries. Returns how many were removed.
fn evict_expired(table: &mut LockTable, now_ms: i64, ttl_ms: u64) -> usize {
    let before = table.len();
    table.retain(|_, record| is_active(record, now_ms, ttl_ms));
    before - table.len()
}

fn require_chat_id(chat_id: &str) -> Result<(), ChatkeepError> {
    if chat_id.is_empty() {
        return Err(ChatkeepError::InvalidChatId);
    }
    Ok(())
}

/// One tab's view of the shared lock table.
pub struct LockManager<B: LockBackend> {
    backend: Arc<B>,
    tab_id: TabId,
    clock: Arc<dyn Clock>,
    settings: LockSettings,
    bus: LockEventBus,
}

impl<B: LockBackend> LockManager<B> {
    pub fn new(
        backend: Arc<B>,
        tab_id: TabId,
        clock: Arc<dyn Clock>,
        settings: LockSettings,
        bus: LockEventBus,
    ) -> Self {
        Self {
            backend,
            tab_id,
            clock,
            settings,
            bus,
        }
    }

    pub fn tab_id(&self) -> &TabId {
        &self.tab_id
    }

    pub fn settings(&self) -> LockSettings {
        self.settings
    }

    /// Receive every lock state change published on this manager's bus.
    pub fn subscribe(&self) -> broadcast::Receiver<LockEvent> {
        self.bus.subscribe()
    }

    fn event(&self, kind: LockEventKind, chat_id: Option<String>, at: i64) -> LockEvent {
        LockEvent {
            kind,
            chat_id,
            tab_id: self.tab_id.clone(),
            at,
        }
    }

    /// Journal the event for other processes, then deliver it locally.
    /// A journal failure only costs remote tabs a notification.
    async fn announce(&self, kind: LockEventKind, chat_id: Option<String>, at: i64) {
        let event = self.event(kind, chat_id, at);
        if let Err(e) = self.backend.append_event(&event, self.bus.origin()).await {
            warn!(error = %e, kind = %event.kind, "could not journal lock event");
        }
        self.bus.publish(event);
    }

    fn announce_blocking(&self, kind: LockEventKind, chat_id: Option<String>, at: i64) {
        let event = self.event(kind, chat_id, at);
        if let Err(e) = self.backend.append_event_blocking(&event, self.bus.origin()) {
            warn!(error = %e, kind = %event.kind, "could not journal lock event");
        }
        self.bus.publish(event);
    }

    /// Claim `chat_id` for this tab, or report the tab that holds it.
    ///
    /// Re-acquiring a lock this tab already holds refreshes it.
    pub async fn acquire(
        &self,
        chat_id: &str,
        title: &str,
    ) -> Result<LockAcquisition, ChatkeepError> {
        require_chat_id(chat_id)?;
        let now = self.clock.now_ms();
        let ttl = self.settings.ttl_ms;
        let record = LockRecord {
            chat_id: chat_id.to_string(),
            chat_title: title.to_string(),
            tab_id: self.tab_id.clone(),
            updated_at: now,
        };

        let outcome = self
            .backend
            .update(move |table| {
                evict_expired(table, now, ttl);
                if let Some(held) = table.get(&record.chat_id) {
                    if held.tab_id != record.tab_id {
                        return LockAcquisition::LockedByOtherTab(held.clone());
                    }
                }
                table.insert(record.chat_id.clone(), record.clone());
                LockAcquisition::Acquired(record)
            })
            .await?;

        match &outcome {
            LockAcquisition::Acquired(_) => {
                debug!(chat_id, tab_id = %self.tab_id, "lock acquired");
                self.announce(LockEventKind::LockUpdated, Some(chat_id.to_string()), now)
                    .await;
            }
            LockAcquisition::LockedByOtherTab(held) => {
                debug!(chat_id, holder = %held.tab_id, "lock held by another tab");
            }
        }
        Ok(outcome)
    }

    /// Heartbeat a lock this tab holds.
    ///
    /// Returns `false` when the lock is no longer ours (it expired, or
    /// another tab took it); the caller must stop assuming exclusivity. An
    /// empty `title` keeps the recorded one.
    pub async fn refresh(&self, chat_id: &str, title: &str) -> Result<bool, ChatkeepError> {
        require_chat_id(chat_id)?;
        let now = self.clock.now_ms();
        let ttl = self.settings.ttl_ms;
        let tab = self.tab_id.clone();
        let key = chat_id.to_string();
        let title = title.trim().to_string();

        let refreshed = self
            .backend
            .update(move |table| {
                evict_expired(table, now, ttl);
                match table.get_mut(&key) {
                    Some(record) if record.tab_id == tab => {
                        record.updated_at = now;
                        if !title.is_empty() {
                            record.chat_title = title;
                        }
                        true
                    }
                    _ => false,
                }
            })
            .await?;

        if !refreshed {
            debug!(chat_id, tab_id = %self.tab_id, "refresh failed, lock not owned");
        }
        Ok(refreshed)
    }

    /// Drop this tab's lock on `chat_id`. Another tab's lock is left alone.
    pub async fn release(&self, chat_id: &str) -> Result<bool, ChatkeepError> {
        require_chat_id(chat_id)?;
        let now = self.clock.now_ms();
        let ttl = self.settings.ttl_ms;
        let tab = self.tab_id.clone();
        let key = chat_id.to_string();

        let released = self
            .backend
            .update(move |table| {
                evict_expired(table, now, ttl);
                if table.get(&key).is_some_and(|r| r.tab_id == tab) {
                    table.remove(&key);
                    true
                } else {
                    false
                }
            })
            .await?;

        if released {
            debug!(chat_id, tab_id = %self.tab_id, "lock released");
            self.announce(LockEventKind::LockReleased, Some(chat_id.to_string()), now)
                .await;
        }
        Ok(released)
    }

    /// Drop every lock this tab holds. Returns whether the table changed.
    pub async fn release_all(&self) -> Result<bool, ChatkeepError> {
        let now = self.clock.now_ms();
        let ttl = self.settings.ttl_ms;
        let tab = self.tab_id.clone();
        let changed = self
            .backend
            .update(move |table| release_owned(table, &tab, now, ttl))
            .await?;
        if changed {
            info!(tab_id = %self.tab_id, "released all locks held by tab");
            self.announce(LockEventKind::LockReleaseAll, None, now).await;
        }
        Ok(changed)
    }

    /// [`release_all`](Self::release_all) without an async runtime, for
    /// teardown paths.
    pub fn release_all_blocking(&self) -> Result<bool, ChatkeepError> {
        let now = self.clock.now_ms();
        let ttl = self.settings.ttl_ms;
        let tab = self.tab_id.clone();
        let changed = self
            .backend
            .update_blocking(move |table| release_owned(table, &tab, now, ttl))?;
        if changed {
            info!(tab_id = %self.tab_id, "released all locks held by tab");
            self.announce_blocking(LockEventKind::LockReleaseAll, None, now);
        }
        Ok(changed)
    }

    /// The live lock on `chat_id`, if any, whoever holds it.
    pub async fn lock_for(&self, chat_id: &str) -> Result<Option<LockRecord>, ChatkeepError> {
        require_chat_id(chat_id)?;
        let now = self.clock.now_ms();
        let table = self.backend.snapshot().await?;
        Ok(table
            .get(chat_id)
            .filter(|r| is_active(r, now, self.settings.ttl_ms))
            .cloned())
    }

    /// Every live lock, ordered by conversation id.
    pub async fn active_locks(&self) -> Result<Vec<LockRecord>, ChatkeepError> {
        let now = self.clock.now_ms();
        let table = self.backend.snapshot().await?;
        Ok(table
            .into_values()
            .filter(|r| is_active(r, now, self.settings.ttl_ms))
            .collect())
    }
}

/// Evict expired entries and remove `tab`'s own. True if anything was removed.
fn release_owned(table: &mut LockTable, tab: &TabId, now: i64, ttl: u64) -> bool {
    let cleaned = evict_expired(table, now, ttl);
    let before = table.len();
    table.retain(|_, record| &record.tab_id != tab);
    cleaned > 0 || table.len() != before
}
