// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Replays lock events written by other processes onto a local bus.
//!
//! Tabs in one process share a [`LockEventBus`] directly. Tabs in other
//! processes only share the database file, so each bus gets one relay that
//! polls the `lock_events` journal and republishes rows from foreign origins.

use std::sync::Arc;
use std::time::Duration;

use chatkeep_core::ChatkeepError;
use chatkeep_lock::LockEventBus;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::database::{Database, map_tr_err};
use crate::queries::lock_events;

/// Handle to a running relay task.
pub struct LockEventRelay {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl LockEventRelay {
    /// Start relaying events journaled after this call.
    ///
    /// Earlier rows are history and are not replayed. The task runs until
    /// `cancel` fires or [`stop`](Self::stop) is called.
    pub async fn spawn(
        db: Arc<Database>,
        bus: LockEventBus,
        poll: Duration,
        cancel: CancellationToken,
    ) -> Result<Self, ChatkeepError> {
        let start = db
            .connection()
            .call(|conn| lock_events::latest_seq(conn))
            .await
            .map_err(map_tr_err)?;
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let mut last = start;
            let mut interval = tokio::time::interval(poll);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match read_after(&db, last).await {
                            Ok(entries) => {
                                for entry in entries {
                                    last = entry.seq;
                                    if entry.origin != bus.origin() {
                                        trace!(seq = entry.seq, kind = %entry.event.kind, "relaying lock event");
                                        bus.publish(entry.event);
                                    }
                                }
                            }
                            Err(e) => warn!(error = %e, "lock event poll failed (non-fatal)"),
                        }
                    }
                    _ = task_cancel.cancelled() => {
                        debug!("lock event relay shutting down");
                        break;
                    }
                }
            }
        });

        Ok(Self { cancel, task })
    }

    /// Stop polling and wait for the task to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "lock event relay ended abnormally");
        }
    }
}

async fn read_after(
    db: &Database,
    seq: i64,
) -> Result<Vec<lock_events::JournalEntry>, ChatkeepError> {
    db.connection()
        .call(move |conn| lock_events::after(conn, seq))
        .await
        .map_err(map_tr_err)
}
