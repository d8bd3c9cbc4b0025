// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lock table held in process memory.
//!
//! Stand-in for the shared store when every tab lives in one process, as in
//! tests. Clones share the same table.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chatkeep_core::{ChatkeepError, LockBackend, LockTable};

#[derive(Debug, Clone, Default)]
pub struct MemoryLockBackend {
    table: Arc<Mutex<LockTable>>,
    writes: Arc<AtomicU64>,
}

impl MemoryLockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of updates that actually changed the table.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn apply<F, R>(&self, f: F) -> Result<R, ChatkeepError>
    where
        F: FnOnce(&mut LockTable) -> R,
    {
        let mut table = self
            .table
            .lock()
            .map_err(|_| ChatkeepError::Internal("lock table mutex poisoned".into()))?;
        let before = table.clone();
        let result = f(&mut table);
        if *table != before {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(result)
    }
}

#[async_trait]
impl LockBackend for MemoryLockBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn update<F, R>(&self, f: F) -> Result<R, ChatkeepError>
    where
        F: FnOnce(&mut LockTable) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.apply(f)
    }

    fn update_blocking<F, R>(&self, f: F) -> Result<R, ChatkeepError>
    where
        F: FnOnce(&mut LockTable) -> R,
    {
        self.apply(f)
    }

    async fn snapshot(&self) -> Result<LockTable, ChatkeepError> {
        self.apply(|table| table.clone())
    }
}
