// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `lock_events` journal.
//!
//! Rows are only appended and pruned, never updated. `seq` comes from
//! `AUTOINCREMENT`, so it is never reused after pruning and readers can
//! resume from the last sequence they saw.

use std::str::FromStr;

use chatkeep_core::{LockEvent, LockEventKind, TabId};
use rusqlite::{Connection, TransactionBehavior, params};
use tracing::warn;

/// Rows kept behind the newest one.
pub const JOURNAL_LIMIT: i64 = 1_000;

/// One journal row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub seq: i64,
    pub origin: String,
    pub event: LockEvent,
}

/// Append `event` and prune rows older than the last [`JOURNAL_LIMIT`].
pub fn append(conn: &mut Connection, event: &LockEvent, origin: &str) -> Result<i64, rusqlite::Error> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute(
        "INSERT INTO lock_events (origin, kind, chat_id, tab_id, at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            origin,
            event.kind.to_string(),
            event.chat_id,
            event.tab_id.as_str(),
            event.at
        ],
    )?;
    let seq = tx.last_insert_rowid();
    tx.execute(
        "DELETE FROM lock_events WHERE seq <= ?1",
        params![seq - JOURNAL_LIMIT],
    )?;
    tx.commit()?;
    Ok(seq)
}

/// Highest sequence written so far, or 0 for an empty journal.
pub fn latest_seq(conn: &Connection) -> Result<i64, rusqlite::Error> {
    conn.query_row("SELECT COALESCE(MAX(seq), 0) FROM lock_events", [], |row| {
        row.get(0)
    })
}

/// Entries after `seq`, oldest first. Rows with an unknown kind are skipped.
pub fn after(conn: &Connection, seq: i64) -> Result<Vec<JournalEntry>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT seq, origin, kind, chat_id, tab_id, at FROM lock_events
         WHERE seq > ?1 ORDER BY seq",
    )?;
    let rows = stmt.query_map(params![seq], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, i64>(5)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (seq, origin, kind, chat_id, tab_id, at) = row?;
        let Ok(kind) = LockEventKind::from_str(&kind) else {
            warn!(seq, kind = %kind, "skipping lock event of unknown kind");
            continue;
        };
        entries.push(JournalEntry {
            seq,
            origin,
            event: LockEvent {
                kind,
                chat_id,
                tab_id: TabId(tab_id),
                at,
            },
        });
    }
    Ok(entries)
}
