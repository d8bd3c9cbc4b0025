// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection setup for the shared database file.
//!
//! Each store handle owns one `tokio-rusqlite` connection; its closures run
//! in order on that connection's background thread. Handles in other tabs
//! open their own connections to the same file, and cross-handle atomicity
//! comes from `BEGIN IMMEDIATE` transactions plus the busy timeout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chatkeep_config::StorageConfig;
use chatkeep_core::ChatkeepError;
use tracing::debug;

use crate::migrations;

pub struct Database {
    conn: tokio_rusqlite::Connection,
    path: PathBuf,
    busy_timeout: Duration,
}

impl Database {
    /// Open (creating if needed) the database at `config.database_path` and
    /// bring its schema up to date.
    pub async fn open(config: &StorageConfig) -> Result<Self, ChatkeepError> {
        let path = PathBuf::from(&config.database_path);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                ChatkeepError::StoreUnavailable(format!(
                    "cannot create {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(&path).await.map_err(|e| {
            ChatkeepError::StoreUnavailable(format!("cannot open {}: {e}", path.display()))
        })?;

        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let wal_mode = config.wal_mode;
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            conn.busy_timeout(busy_timeout)?;
            if wal_mode {
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            }
            conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| migrations::run_migrations(conn))
            .await
            .map_err(map_tr_err)?;

        debug!(path = %path.display(), wal_mode, "database opened");
        Ok(Self {
            conn,
            path,
            busy_timeout,
        })
    }

    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A fresh synchronous connection to the same file, for paths that cannot
    /// await (teardown hooks).
    pub fn open_blocking(&self) -> Result<rusqlite::Connection, rusqlite::Error> {
        let conn = rusqlite::Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }

    /// Fold the WAL back into the main file.
    pub async fn checkpoint(&self) -> Result<(), ChatkeepError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Map a failed `call` into the crate error.
pub(crate) fn map_tr_err<E>(e: tokio_rusqlite::Error<E>) -> ChatkeepError
where
    E: std::error::Error + Send + Sync + 'static,
{
    match e {
        tokio_rusqlite::Error::ConnectionClosed => {
            ChatkeepError::StoreUnavailable("database connection closed".into())
        }
        tokio_rusqlite::Error::Error(e) => ChatkeepError::storage(e),
        other => ChatkeepError::Internal(format!("database error: {other}")),
    }
}
