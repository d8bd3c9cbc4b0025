// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One tab's view of the shared store.
//!
//! A [`TabSession`] owns the tab's store handle and lock manager. Dropping
//! it releases every lock the tab still holds, without awaiting.
//!
//! The first session opened on a [`LockEventBus`] also runs the relay that
//! feeds it lock events from other processes sharing the database.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chatkeep_config::ChatkeepConfig;
use chatkeep_core::{
    ChatkeepError, Clock, Conversation, LoadedState, SaveReport, SaveRequest, StorageAdapter,
    TabId,
};
use chatkeep_lock::{LockEventBus, LockManager, LockSettings};
use chatkeep_merge::{
    ArchiveScope, ImportMode, MergePolicy, build_archive, copy_conversation, fork_conversation,
    merge_conversation_sets, parse_archive, repair_conversations,
};
use chatkeep_storage::{
    ChatStore, FileLegacyStore, LockEventRelay, SqliteLockBackend, overwritten_ids,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::notifier::SaveFailureNotifier;

/// What an import did to the stored set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    /// Conversations the store did not have before.
    pub added: usize,
    /// Conversations merged into an existing one with the same id.
    pub merged: usize,
    /// Conversations removed by an overwrite.
    pub removed: usize,
    /// Conversations stored after the import.
    pub total: usize,
}

pub struct TabSession {
    store: Arc<ChatStore>,
    locks: Arc<LockManager<SqliteLockBackend>>,
    clock: Arc<dyn Clock>,
    notifier: SaveFailureNotifier,
    notice: Mutex<Option<String>>,
    bus: LockEventBus,
    relay: Option<LockEventRelay>,
    relay_cancel: CancellationToken,
}

impl TabSession {
    /// Open the configured store as tab `tab_id`.
    ///
    /// Tabs in the same process should share `bus` so they see each other's
    /// lock events.
    pub async fn open(
        config: &ChatkeepConfig,
        tab_id: TabId,
        bus: LockEventBus,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ChatkeepError> {
        let mut store = ChatStore::new(config.storage.clone(), tab_id.clone(), clock.clone());
        if let Some(dir) = &config.storage.legacy_dir {
            store = store.with_legacy(Arc::new(FileLegacyStore::new(dir)));
        }
        store.initialize().await?;

        let db = store.database()?;
        let relay_cancel = CancellationToken::new();
        let relay = if bus.claim_relay() {
            let poll = Duration::from_millis(config.locks.event_poll_ms);
            match LockEventRelay::spawn(db.clone(), bus.clone(), poll, relay_cancel.clone()).await {
                Ok(relay) => Some(relay),
                Err(e) => {
                    bus.release_relay();
                    return Err(e);
                }
            }
        } else {
            None
        };

        let settings = LockSettings {
            ttl_ms: config.locks.ttl_ms,
            heartbeat_ms: config.locks.heartbeat_ms,
        };
        let backend = SqliteLockBackend::new(db);
        let locks = LockManager::new(
            Arc::new(backend),
            tab_id,
            clock.clone(),
            settings,
            bus.clone(),
        );
        debug!(tab_id = %locks.tab_id(), relay = relay.is_some(), "tab session opened");

        Ok(Self {
            store: Arc::new(store),
            locks: Arc::new(locks),
            clock,
            notifier: SaveFailureNotifier::new(),
            notice: Mutex::new(None),
            bus,
            relay,
            relay_cancel,
        })
    }

    pub fn tab_id(&self) -> &TabId {
        self.store.tab_id()
    }

    pub fn store(&self) -> &Arc<ChatStore> {
        &self.store
    }

    pub fn locks(&self) -> &Arc<LockManager<SqliteLockBackend>> {
        &self.locks
    }

    pub async fn load(&self) -> LoadedState {
        self.store.load().await
    }

    /// Save through the store, reporting each distinct failure once.
    pub async fn save(&self, request: SaveRequest) -> Result<SaveReport, ChatkeepError> {
        match self.store.save(request).await {
            Ok(report) => {
                self.notifier.succeeded();
                Ok(report)
            }
            Err(e) => {
                if let Some(notice) = self.notifier.failed(&e) {
                    *self.notice.lock().unwrap_or_else(|p| p.into_inner()) = Some(notice);
                }
                Err(e)
            }
        }
    }

    /// The pending save-failure notice, if a new failure happened since the
    /// last call.
    pub fn take_save_notice(&self) -> Option<String> {
        self.notice.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    async fn find(&self, chat_id: &str) -> Result<(LoadedState, Conversation), ChatkeepError> {
        let state = self.load().await;
        let chat = state
            .conversations
            .iter()
            .find(|c| c.id == chat_id)
            .cloned()
            .ok_or_else(|| ChatkeepError::NotFound(chat_id.to_string()))?;
        Ok((state, chat))
    }

    /// Delete a conversation everywhere, including from stale tabs' later saves.
    pub async fn delete(&self, chat_id: &str) -> Result<SaveReport, ChatkeepError> {
        let (state, _) = self.find(chat_id).await?;
        let remaining: Vec<Conversation> = state
            .conversations
            .into_iter()
            .filter(|c| c.id != chat_id)
            .collect();
        let current = state
            .current_id
            .filter(|id| id != chat_id)
            .or_else(|| remaining.first().map(|c| c.id.clone()));

        let report = self
            .save(
                SaveRequest::new(remaining)
                    .with_current_id(current)
                    .with_deleted_ids([chat_id.to_string()]),
            )
            .await?;
        self.locks.release(chat_id).await?;
        info!(chat_id, "conversation deleted");
        Ok(report)
    }

    /// Rename a conversation. Later renames win over earlier ones in every tab.
    pub async fn rename(&self, chat_id: &str, title: &str) -> Result<Conversation, ChatkeepError> {
        let (state, mut chat) = self.find(chat_id).await?;
        chat.rename(title);
        self.save(SaveRequest::new(vec![chat.clone()]).with_current_id(state.current_id))
            .await?;
        Ok(chat)
    }

    /// Replace a message's content. The edit survives merges with stale
    /// copies, including longer ones.
    pub async fn edit_message(
        &self,
        chat_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<Conversation, ChatkeepError> {
        let (state, mut chat) = self.find(chat_id).await?;
        chat.message_mut(message_id)
            .ok_or_else(|| ChatkeepError::NotFound(message_id.to_string()))?
            .edit(content);
        self.save(SaveRequest::new(vec![chat.clone()]).with_current_id(state.current_id))
            .await?;
        Ok(chat)
    }

    /// Remove one message, including from stale tabs' later saves.
    pub async fn delete_message(
        &self,
        chat_id: &str,
        message_id: &str,
    ) -> Result<SaveReport, ChatkeepError> {
        let (state, mut chat) = self.find(chat_id).await?;
        chat.remove_message(message_id)
            .ok_or_else(|| ChatkeepError::NotFound(message_id.to_string()))?;
        let report = self
            .save(
                SaveRequest::new(vec![chat])
                    .with_current_id(state.current_id)
                    .with_deleted_message_ids([message_id.to_string()]),
            )
            .await?;
        debug!(chat_id, message_id, "message deleted");
        Ok(report)
    }

    /// Fork `chat_id` after message `upto_index` and make the fork current.
    pub async fn fork(&self, chat_id: &str, upto_index: usize) -> Result<Conversation, ChatkeepError> {
        let (_, source) = self.find(chat_id).await?;
        let fork = fork_conversation(&source, upto_index, self.clock.now_ms());
        self.save(SaveRequest::new(vec![fork.clone()]).with_current_id(Some(fork.id.clone())))
            .await?;
        Ok(fork)
    }

    /// Duplicate `chat_id` and make the copy current.
    pub async fn copy(&self, chat_id: &str) -> Result<Conversation, ChatkeepError> {
        let (_, source) = self.find(chat_id).await?;
        let copy = copy_conversation(&source, self.clock.now_ms());
        self.save(SaveRequest::new(vec![copy.clone()]).with_current_id(Some(copy.id.clone())))
            .await?;
        Ok(copy)
    }

    /// Apply an archive's conversations to the store.
    ///
    /// `Merge` unions them with what is stored, retitling newcomers as
    /// branches. `Overwrite` makes the archive the whole set; conversations
    /// missing from it are deleted.
    pub async fn import_archive(
        &self,
        text: &str,
        mode: ImportMode,
    ) -> Result<ImportSummary, ChatkeepError> {
        let archive = parse_archive(text)?;
        archive.check_mode(mode)?;
        let incoming = repair_conversations(&archive.chats, self.clock.as_ref()).chats;
        let incoming_ids: Vec<String> = incoming.iter().map(|c| c.id.clone()).collect();
        let incoming_message_ids: Vec<String> = incoming
            .iter()
            .flat_map(|c| c.messages.iter().map(|m| m.id.clone()))
            .collect();
        let state = self.load().await;

        let (request, added, merged, removed) = match mode {
            ImportMode::Merge => {
                let outcome =
                    merge_conversation_sets(state.conversations, incoming, MergePolicy::Import);
                let current = state.current_id;
                (
                    SaveRequest::new(outcome.conversations).with_current_id(current),
                    outcome.added,
                    outcome.merged,
                    0,
                )
            }
            ImportMode::Overwrite => {
                let existing: HashSet<&str> =
                    state.conversations.iter().map(|c| c.id.as_str()).collect();
                let merged = incoming_ids
                    .iter()
                    .filter(|id| existing.contains(id.as_str()))
                    .count();
                let added = incoming.len() - merged;
                let removed = overwritten_ids(&state.conversations, &incoming);
                let removed_count = removed.len();
                let current = incoming.first().map(|c| c.id.clone());
                (
                    SaveRequest::new(incoming)
                        .with_current_id(current)
                        .with_deleted_ids(removed),
                    added,
                    merged,
                    removed_count,
                )
            }
        };

        let report = self
            .save(
                request
                    .with_revived_ids(incoming_ids)
                    .with_revived_message_ids(incoming_message_ids),
            )
            .await?;
        let summary = ImportSummary {
            added,
            merged,
            removed,
            total: report.conversation_count,
        };
        info!(
            mode = %mode,
            added = summary.added,
            merged = summary.merged,
            removed = summary.removed,
            "archive imported"
        );
        Ok(summary)
    }

    /// Export every conversation, or only the current one.
    pub async fn export_archive(&self, current_only: bool) -> Result<Value, ChatkeepError> {
        let state = self.load().await;
        let now = self.clock.now_ms();
        if !current_only {
            return build_archive(&state.conversations, &ArchiveScope::Full, now);
        }
        let current_id = state
            .current_id
            .ok_or_else(|| ChatkeepError::NotFound("no current conversation".into()))?;
        let chat: Vec<Conversation> = state
            .conversations
            .into_iter()
            .filter(|c| c.id == current_id)
            .collect();
        build_archive(&chat, &ArchiveScope::Single { current_chat_id: current_id }, now)
    }
}

impl Drop for TabSession {
    fn drop(&mut self) {
        match self.locks.release_all_blocking() {
            Ok(true) => debug!(tab_id = %self.locks.tab_id(), "released tab locks on teardown"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "could not release tab locks on teardown"),
        }
        if self.relay.take().is_some() {
            self.relay_cancel.cancel();
            self.bus.release_relay();
        }
    }
}
