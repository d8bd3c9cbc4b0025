// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background refresh of a held lock.

use std::sync::Arc;

use chatkeep_core::LockBackend;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::manager::LockManager;

/// State of a lock kept alive by a heartbeat task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatStatus {
    Held,
    /// A refresh found the lock gone or owned by another tab.
    Lost,
    /// The task was cancelled; the lock was not released by it.
    Stopped,
}

/// Handle to a running heartbeat task.
pub struct Heartbeat {
    status: watch::Receiver<HeartbeatStatus>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Heartbeat {
    /// Watch the lock state; resolves on every change.
    pub fn status(&self) -> watch::Receiver<HeartbeatStatus> {
        self.status.clone()
    }

    /// Stop refreshing and wait for the task to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "heartbeat task ended abnormally");
        }
    }
}

impl<B: LockBackend> LockManager<B> {
    /// Refresh the lock on `chat_id` every heartbeat interval until `cancel`
    /// fires or a refresh reports the lock lost.
    ///
    /// Storage errors during a refresh are logged and retried on the next
    /// tick; if they persist the lock expires and the next successful
    /// refresh reports it lost.
    pub fn spawn_heartbeat(
        self: &Arc<Self>,
        chat_id: String,
        title: String,
        cancel: CancellationToken,
    ) -> Heartbeat {
        let (tx, rx) = watch::channel(HeartbeatStatus::Held);
        let manager = Arc::clone(self);
        let task_cancel = cancel.clone();
        let period = self.settings().heartbeat_interval();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // Skip the first immediate tick.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match manager.refresh(&chat_id, &title).await {
                            Ok(true) => debug!(chat_id = %chat_id, "lock heartbeat"),
                            Ok(false) => {
                                info!(chat_id = %chat_id, "lock lost, stopping heartbeat");
                                let _ = tx.send(HeartbeatStatus::Lost);
                                break;
                            }
                            Err(e) => {
                                warn!(
                                    chat_id = %chat_id,
                                    error = %e,
                                    "lock heartbeat failed (non-fatal)"
                                );
                            }
                        }
                    }
                    _ = task_cancel.cancelled() => {
                        debug!(chat_id = %chat_id, "lock heartbeat shutting down");
                        let _ = tx.send(HeartbeatStatus::Stopped);
                        break;
                    }
                }
            }
        });

        Heartbeat {
            status: rx,
            cancel,
            task,
        }
    }
}
