// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lock table persisted in the shared database.
//!
//! The table is one JSON value under [`LOCKS_KEY`]. Every update runs in a
//! `BEGIN IMMEDIATE` transaction, which is the mutual exclusion all tabs
//! contend on. Lock events are appended to the `lock_events` journal so
//! tabs in other processes can replay them.

use std::sync::Arc;

use async_trait::async_trait;
use chatkeep_core::{ChatkeepError, LockBackend, LockEvent, LockTable};
use rusqlite::{Connection, TransactionBehavior};
use tracing::warn;

use crate::database::{Database, map_tr_err};
use crate::queries::kv::{self, LOCKS_KEY};
use crate::queries::lock_events;

#[derive(Clone)]
pub struct SqliteLockBackend {
    db: Arc<Database>,
}

impl SqliteLockBackend {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

fn read_table(conn: &Connection) -> Result<LockTable, rusqlite::Error> {
    let Some(raw) = kv::read(conn, LOCKS_KEY)? else {
        return Ok(LockTable::new());
    };
    Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!(error = %e, "lock table is corrupted, starting fresh");
        LockTable::new()
    }))
}

fn update_in_transaction<F, R>(conn: &mut Connection, f: F) -> Result<R, rusqlite::Error>
where
    F: FnOnce(&mut LockTable) -> R,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut table = read_table(&tx)?;
    let before = table.clone();
    let result = f(&mut table);
    if table != before {
        if table.is_empty() {
            kv::remove(&tx, LOCKS_KEY)?;
        } else {
            let raw = serde_json::to_string(&table)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            kv::write(&tx, LOCKS_KEY, &raw)?;
        }
    }
    tx.commit()?;
    Ok(result)
}

#[async_trait]
impl LockBackend for SqliteLockBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn update<F, R>(&self, f: F) -> Result<R, ChatkeepError>
    where
        F: FnOnce(&mut LockTable) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.db
            .connection()
            .call(move |conn| update_in_transaction(conn, f))
            .await
            .map_err(map_tr_err)
    }

    fn update_blocking<F, R>(&self, f: F) -> Result<R, ChatkeepError>
    where
        F: FnOnce(&mut LockTable) -> R,
    {
        let mut conn = self.db.open_blocking().map_err(ChatkeepError::storage)?;
        update_in_transaction(&mut conn, f).map_err(ChatkeepError::storage)
    }

    async fn snapshot(&self) -> Result<LockTable, ChatkeepError> {
        self.db
            .connection()
            .call(|conn| read_table(conn))
            .await
            .map_err(map_tr_err)
    }

    async fn append_event(&self, event: &LockEvent, origin: &str) -> Result<(), ChatkeepError> {
        let event = event.clone();
        let origin = origin.to_string();
        self.db
            .connection()
            .call(move |conn| lock_events::append(conn, &event, &origin).map(|_| ()))
            .await
            .map_err(map_tr_err)
    }

    fn append_event_blocking(&self, event: &LockEvent, origin: &str) -> Result<(), ChatkeepError> {
        let mut conn = self.db.open_blocking().map_err(ChatkeepError::storage)?;
        lock_events::append(&mut conn, event, origin)
            .map(|_| ())
            .map_err(ChatkeepError::storage)
    }
}
