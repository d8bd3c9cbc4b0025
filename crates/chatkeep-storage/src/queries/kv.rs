// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key/value reads and writes.
//!
//! The plain functions take a `rusqlite::Connection` (a `Transaction` derefs
//! to one) so they compose inside a single read-merge-write transaction. The
//! async wrappers run one statement on a [`Database`].

use chatkeep_core::ChatkeepError;
use rusqlite::{Connection, OptionalExtension, params};

use crate::database::{Database, map_tr_err};

/// Key of the serialized conversation array.
pub const CHATS_KEY: &str = "chat_history";
/// Key of the deletion tombstones (`{id: deleted_at_ms}`).
pub const TOMBSTONES_KEY: &str = "deleted_chat_ids";
/// Key of the message deletion tombstones (`{id: deleted_at_ms}`).
pub const MESSAGE_TOMBSTONES_KEY: &str = "deleted_message_ids";
/// Key of the shared lock table.
pub const LOCKS_KEY: &str = "chat_locks_v1";

/// Key of one tab's current-conversation pointer.
pub fn current_id_key(tab_id: &str) -> String {
    format!("current_chat_id:{tab_id}")
}

pub fn read(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
        row.get(0)
    })
    .optional()
}

pub fn write(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO kv (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET
             value = excluded.value,
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
        params![key, value],
    )?;
    Ok(())
}

/// Returns whether a row was removed.
pub fn remove(conn: &Connection, key: &str) -> Result<bool, rusqlite::Error> {
    Ok(conn.execute("DELETE FROM kv WHERE key = ?1", params![key])? > 0)
}

/// Write `value` when present, otherwise remove the key.
pub fn write_or_remove(
    conn: &Connection,
    key: &str,
    value: Option<&str>,
) -> Result<(), rusqlite::Error> {
    match value {
        Some(value) if !value.is_empty() => write(conn, key, value),
        _ => remove(conn, key).map(|_| ()),
    }
}

/// Keys starting with `prefix`, sorted.
pub fn keys_with_prefix(conn: &Connection, prefix: &str) -> Result<Vec<String>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key FROM kv WHERE substr(key, 1, ?2) = ?1 ORDER BY key")?;
    let rows = stmt.query_map(params![prefix, prefix.len() as i64], |row| row.get(0))?;
    rows.collect()
}

pub async fn get(db: &Database, key: &str) -> Result<Option<String>, ChatkeepError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| read(conn, &key))
        .await
        .map_err(map_tr_err)
}

pub async fn put(db: &Database, key: &str, value: &str) -> Result<(), ChatkeepError> {
    let key = key.to_string();
    let value = value.to_string();
    db.connection()
        .call(move |conn| write(conn, &key, &value))
        .await
        .map_err(map_tr_err)
}

pub async fn delete(db: &Database, key: &str) -> Result<bool, ChatkeepError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| remove(conn, &key))
        .await
        .map_err(map_tr_err)
}
