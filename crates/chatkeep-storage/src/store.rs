// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of [`StorageAdapter`].
//!
//! Every write re-reads the persisted set inside a `BEGIN IMMEDIATE`
//! transaction, merges the proposed set into it and writes the merged result
//! back, so two tabs saving concurrently never drop each other's messages.
//! Writes from one handle additionally go through a [`WriteQueue`] so they
//! never interleave.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chatkeep_config::StorageConfig;
use chatkeep_core::{
    ChatkeepError, Clock, Conversation, HealthStatus, LoadSource, LoadedState, SaveReport,
    SaveRequest, StorageAdapter, TabId,
};
use chatkeep_merge::{
    MergePolicy, RepairOutcome, filter_deleted, filter_deleted_messages, merge_conversation_sets,
    repair_conversations, repair_typed,
};
use rusqlite::{Connection, TransactionBehavior};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::database::{Database, map_tr_err};
use crate::legacy::{LEGACY_CHATS_KEY, LEGACY_CURRENT_ID_KEY, LegacyStore};
use crate::queries::kv::{
    self, CHATS_KEY, MESSAGE_TOMBSTONES_KEY, TOMBSTONES_KEY, current_id_key,
};
use crate::writer::WriteQueue;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Deleted conversation or message id to deletion time (ms).
pub type Tombstones = BTreeMap<String, i64>;

struct Inner {
    db: Arc<Database>,
    queue: WriteQueue,
}

/// One tab's handle on the shared conversation store.
///
/// Nothing is opened until [`initialize`](Self::initialize); until then
/// writes fail with [`ChatkeepError::StoreUnavailable`] and loads come back
/// empty.
pub struct ChatStore {
    config: StorageConfig,
    tab_id: TabId,
    clock: Arc<dyn Clock>,
    legacy: Option<Arc<dyn LegacyStore>>,
    inner: OnceCell<Inner>,
}

impl ChatStore {
    pub fn new(config: StorageConfig, tab_id: TabId, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            tab_id,
            clock,
            legacy: None,
            inner: OnceCell::new(),
        }
    }

    /// Migrate from `legacy` on the first load that finds the store empty.
    pub fn with_legacy(mut self, legacy: Arc<dyn LegacyStore>) -> Self {
        self.legacy = Some(legacy);
        self
    }

    /// Open the database and start the write queue.
    pub async fn initialize(&self) -> Result<(), ChatkeepError> {
        let db = Database::open(&self.config).await?;
        self.inner
            .set(Inner {
                db: Arc::new(db),
                queue: WriteQueue::spawn(),
            })
            .map_err(|_| ChatkeepError::Internal("store already initialized".into()))?;
        debug!(
            path = %self.config.database_path,
            tab_id = %self.tab_id,
            "chat store initialized"
        );
        Ok(())
    }

    pub fn tab_id(&self) -> &TabId {
        &self.tab_id
    }

    /// The opened database, shared with the SQLite lock backend.
    pub fn database(&self) -> Result<Arc<Database>, ChatkeepError> {
        Ok(self.inner()?.db.clone())
    }

    /// Checkpoint the WAL. The store stays usable.
    pub async fn close(&self) -> Result<(), ChatkeepError> {
        self.inner()?.db.checkpoint().await
    }

    /// Current deletion tombstones.
    pub async fn tombstones(&self) -> Result<Tombstones, ChatkeepError> {
        let raw = kv::get(&self.inner()?.db, TOMBSTONES_KEY).await?;
        Ok(parse_tombstones(raw.as_deref()))
    }

    /// Current message deletion tombstones.
    pub async fn message_tombstones(&self) -> Result<Tombstones, ChatkeepError> {
        let raw = kv::get(&self.inner()?.db, MESSAGE_TOMBSTONES_KEY).await?;
        Ok(parse_tombstones(raw.as_deref()))
    }

    fn inner(&self) -> Result<&Inner, ChatkeepError> {
        self.inner.get().ok_or_else(|| {
            ChatkeepError::StoreUnavailable("store not initialized, call initialize() first".into())
        })
    }

    async fn try_load(&self) -> Result<LoadedState, ChatkeepError> {
        let inner = self.inner()?;
        let migrated = self.migrate_legacy(inner).await?;

        let pointer_key = current_id_key(self.tab_id.as_str());
        let (raw, saved_current) = inner
            .db
            .connection()
            .call(move |conn| -> Result<_, rusqlite::Error> {
                Ok((kv::read(conn, CHATS_KEY)?, kv::read(conn, &pointer_key)?))
            })
            .await
            .map_err(map_tr_err)?;

        let source = if migrated {
            LoadSource::MigratedFromLegacy
        } else {
            LoadSource::Embedded
        };
        let Some(raw) = raw.filter(|raw| !raw.is_empty()) else {
            return Ok(LoadedState::empty());
        };

        let values: Vec<Value> = match serde_json::from_str(&raw) {
            Ok(values) => values,
            Err(e) => {
                warn!(error = %e, "stored conversation set is corrupted, clearing it");
                self.clear().await?;
                return Ok(LoadedState::empty());
            }
        };

        let mut outcome = repair_conversations(&values, self.clock.as_ref());
        let mut repair = None;
        if outcome.changed {
            info!(
                total = outcome.stats.total_chats,
                chats = outcome.stats.repaired_chat_count,
                messages = outcome.stats.repaired_message_count,
                "repairing stored conversations"
            );
            repair = Some(outcome.stats);
            if let Some(rewritten) = self.write_back_repair(inner).await? {
                outcome = rewritten;
            }
        }

        let current_id = outcome.resolve_current_id(saved_current.as_deref());
        Ok(LoadedState {
            conversations: outcome.chats,
            current_id,
            source,
            repair,
        })
    }

    /// Move legacy flat data into the database when the database is empty.
    /// Returns whether anything was migrated.
    async fn migrate_legacy(&self, inner: &Inner) -> Result<bool, ChatkeepError> {
        let Some(legacy) = &self.legacy else {
            return Ok(false);
        };
        if kv::get(&inner.db, CHATS_KEY)
            .await?
            .is_some_and(|raw| !raw.is_empty())
        {
            return Ok(false);
        }
        let Some(history) = legacy.read(LEGACY_CHATS_KEY).await?.filter(|h| !h.is_empty()) else {
            return Ok(false);
        };

        if serde_json::from_str::<Vec<Value>>(&history).is_err() {
            warn!("legacy conversation set is corrupted, discarding it");
            legacy.remove(LEGACY_CHATS_KEY).await?;
            legacy.remove(LEGACY_CURRENT_ID_KEY).await?;
            return Ok(false);
        }
        let current = legacy.read(LEGACY_CURRENT_ID_KEY).await?;

        let pointer_key = current_id_key(self.tab_id.as_str());
        let db = inner.db.clone();
        let wrote = inner
            .queue
            .submit(async move {
                db.connection()
                    .call(move |conn| -> Result<bool, rusqlite::Error> {
                        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                        // Another tab may have migrated while we were reading.
                        if kv::read(&tx, CHATS_KEY)?.is_some_and(|raw| !raw.is_empty()) {
                            return Ok(false);
                        }
                        kv::write(&tx, CHATS_KEY, &history)?;
                        kv::write_or_remove(&tx, &pointer_key, current.as_deref())?;
                        tx.commit()?;
                        Ok(true)
                    })
                    .await
                    .map_err(map_tr_err)
            })
            .await?;

        legacy.remove(LEGACY_CHATS_KEY).await?;
        legacy.remove(LEGACY_CURRENT_ID_KEY).await?;
        if wrote {
            info!("migrated conversations from legacy storage");
        }
        Ok(wrote)
    }

    /// Re-read, re-repair and persist inside the write lock. `None` when the
    /// stored set vanished or became unreadable meanwhile.
    async fn write_back_repair(
        &self,
        inner: &Inner,
    ) -> Result<Option<RepairOutcome>, ChatkeepError> {
        let db = inner.db.clone();
        let clock = self.clock.clone();
        let pointer_key = current_id_key(self.tab_id.as_str());
        inner
            .queue
            .submit(async move {
                db.connection()
                    .call(move |conn| -> Result<_, rusqlite::Error> {
                        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                        let Some(raw) = kv::read(&tx, CHATS_KEY)? else {
                            return Ok(None);
                        };
                        let Ok(values) = serde_json::from_str::<Vec<Value>>(&raw) else {
                            return Ok(None);
                        };
                        let outcome = repair_conversations(&values, clock.as_ref());
                        if outcome.changed {
                            kv::write(&tx, CHATS_KEY, &to_json(&outcome.chats)?)?;
                            let saved = kv::read(&tx, &pointer_key)?;
                            let remapped = outcome.resolve_current_id(saved.as_deref());
                            kv::write_or_remove(&tx, &pointer_key, remapped.as_deref())?;
                        }
                        tx.commit()?;
                        Ok(Some(outcome))
                    })
                    .await
                    .map_err(map_tr_err)
            })
            .await
    }
}

#[async_trait]
impl StorageAdapter for ChatStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn health_check(&self) -> Result<HealthStatus, ChatkeepError> {
        let inner = match self.inner() {
            Ok(inner) => inner,
            Err(e) => return Ok(HealthStatus::Unhealthy(e.to_string())),
        };
        let ping = inner
            .db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> { conn.execute_batch("SELECT 1;") })
            .await;
        Ok(match ping {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Degraded(map_tr_err(e).to_string()),
        })
    }

    async fn load(&self) -> LoadedState {
        match self.try_load().await {
            Ok(state) => {
                debug!(
                    conversations = state.conversations.len(),
                    source = %state.source,
                    "loaded conversations"
                );
                state
            }
            Err(e) => {
                warn!(error = %e, "store unavailable, starting empty");
                LoadedState::empty()
            }
        }
    }

    async fn save(&self, request: SaveRequest) -> Result<SaveReport, ChatkeepError> {
        let inner = self.inner()?;
        let db = inner.db.clone();
        let clock = self.clock.clone();
        let pointer_key = current_id_key(self.tab_id.as_str());
        let retention_ms = i64::from(self.config.tombstone_retention_days) * DAY_MS;

        let result = inner
            .queue
            .submit(async move {
                db.connection()
                    .call(move |conn| {
                        save_in_transaction(conn, request, clock.as_ref(), &pointer_key, retention_ms)
                    })
                    .await
                    .map_err(map_tr_err)
            })
            .await;

        match &result {
            Ok(report) => debug!(
                changed = report.changed,
                conversations = report.conversation_count,
                suppressed = report.suppressed_deleted,
                "saved conversations"
            ),
            Err(e) => error!(error = %e, "saving conversations failed"),
        }
        result
    }

    async fn save_current_id(&self, id: Option<String>) -> Result<(), ChatkeepError> {
        let inner = self.inner()?;
        let db = inner.db.clone();
        let pointer_key = current_id_key(self.tab_id.as_str());
        inner
            .queue
            .submit(async move {
                db.connection()
                    .call(move |conn| kv::write_or_remove(conn, &pointer_key, id.as_deref()))
                    .await
                    .map_err(map_tr_err)
            })
            .await
    }

    async fn clear(&self) -> Result<(), ChatkeepError> {
        let inner = self.inner()?;
        let db = inner.db.clone();
        let pointer_key = current_id_key(self.tab_id.as_str());
        inner
            .queue
            .submit(async move {
                db.connection()
                    .call(move |conn| -> Result<(), rusqlite::Error> {
                        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                        kv::remove(&tx, CHATS_KEY)?;
                        kv::remove(&tx, &pointer_key)?;
                        tx.commit()
                    })
                    .await
                    .map_err(map_tr_err)
            })
            .await?;
        info!(tab_id = %self.tab_id, "cleared stored conversations");
        Ok(())
    }
}

/// One read-merge-write cycle, atomic with respect to every other handle.
fn save_in_transaction(
    conn: &mut Connection,
    request: SaveRequest,
    clock: &dyn Clock,
    pointer_key: &str,
    retention_ms: i64,
) -> Result<SaveReport, rusqlite::Error> {
    let now = clock.now_ms();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let persisted_raw = kv::read(&tx, CHATS_KEY)?;
    let persisted = match persisted_raw.as_deref().filter(|raw| !raw.is_empty()) {
        None => Vec::new(),
        Some(raw) => match serde_json::from_str::<Vec<Value>>(raw) {
            Ok(values) => repair_conversations(&values, clock).chats,
            Err(e) => {
                warn!(error = %e, "stored conversation set is corrupted, replacing it");
                Vec::new()
            }
        },
    };

    let mut tombstones = TombstoneSet::read(&tx, TOMBSTONES_KEY)?;
    tombstones.update(&request.deleted_ids, &request.revived_ids, now, retention_ms);
    let mut message_tombstones = TombstoneSet::read(&tx, MESSAGE_TOMBSTONES_KEY)?;
    message_tombstones.update(
        &request.deleted_message_ids,
        &request.revived_message_ids,
        now,
        retention_ms,
    );

    let proposed = repair_typed(&request.conversations, clock).chats;
    let merged = merge_conversation_sets(persisted, proposed, MergePolicy::Sync);
    let (mut conversations, suppressed_deleted) =
        filter_deleted(merged.conversations, &tombstones.ids());
    let suppressed_messages = filter_deleted_messages(&mut conversations, &message_tombstones.ids());

    let serialized = to_json(&conversations)?;
    let changed = persisted_raw.as_deref() != Some(serialized.as_str());
    if changed {
        kv::write(&tx, CHATS_KEY, &serialized)?;
    }
    tombstones.write(&tx, TOMBSTONES_KEY)?;
    message_tombstones.write(&tx, MESSAGE_TOMBSTONES_KEY)?;
    kv::write_or_remove(&tx, pointer_key, request.current_id.as_deref())?;
    tx.commit()?;

    Ok(SaveReport {
        changed,
        conversation_count: conversations.len(),
        suppressed_deleted,
        suppressed_messages,
    })
}

/// Tombstones as read inside a save, remembering what was on disk.
struct TombstoneSet {
    before: Tombstones,
    current: Tombstones,
}

impl TombstoneSet {
    fn read(conn: &Connection, key: &str) -> Result<Self, rusqlite::Error> {
        let raw = kv::read(conn, key)?;
        let before = parse_tombstones(raw.as_deref());
        Ok(Self {
            current: before.clone(),
            before,
        })
    }

    fn update(&mut self, deleted: &[String], revived: &[String], now: i64, retention_ms: i64) {
        for id in deleted.iter().filter(|id| !id.is_empty()) {
            self.current.insert(id.clone(), now);
        }
        for id in revived {
            self.current.remove(id);
        }
        self.current
            .retain(|_, deleted_at| now - *deleted_at <= retention_ms);
    }

    fn ids(&self) -> HashSet<String> {
        self.current.keys().cloned().collect()
    }

    fn write(&self, conn: &Connection, key: &str) -> Result<(), rusqlite::Error> {
        if self.current == self.before {
            return Ok(());
        }
        if self.current.is_empty() {
            kv::remove(conn, key).map(|_| ())
        } else {
            kv::write(conn, key, &to_json(&self.current)?)
        }
    }
}

fn parse_tombstones(raw: Option<&str>) -> Tombstones {
    match raw {
        None => Tombstones::new(),
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
            warn!(error = %e, "deletion tombstones are corrupted, dropping them");
            Tombstones::new()
        }),
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, rusqlite::Error> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

/// Ids present in `existing` but missing from `replacement`, i.e. what an
/// overwrite import deletes.
pub fn overwritten_ids(existing: &[Conversation], replacement: &[Conversation]) -> Vec<String> {
    let keep: HashSet<&str> = replacement.iter().map(|c| c.id.as_str()).collect();
    existing
        .iter()
        .filter(|c| !keep.contains(c.id.as_str()))
        .map(|c| c.id.clone())
        .collect()
}
