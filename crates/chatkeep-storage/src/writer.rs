// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! FIFO queue for one store handle's writes.
//!
//! Jobs run one at a time on a background task in submission order. A
//! caller that stops waiting does not cancel its job; the write still
//! completes and is persisted.

use std::future::Future;
use std::pin::Pin;

use chatkeep_core::ChatkeepError;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Debug, Clone)]
pub struct WriteQueue {
    jobs: mpsc::UnboundedSender<Job>,
}

impl WriteQueue {
    /// Start the worker. Must be called inside a tokio runtime.
    ///
    /// The worker exits once every handle to the queue is dropped.
    pub fn spawn() -> Self {
        let (jobs, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
            }
            debug!("write queue drained");
        });
        Self { jobs }
    }

    /// Run `job` after every previously submitted job and return its result.
    pub async fn submit<F, T>(&self, job: F) -> Result<T, ChatkeepError>
    where
        F: Future<Output = Result<T, ChatkeepError>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let wrapped: Job = Box::pin(async move {
            let _ = tx.send(job.await);
        });
        self.jobs
            .send(wrapped)
            .map_err(|_| ChatkeepError::StoreUnavailable("write queue closed".into()))?;
        rx.await
            .map_err(|_| ChatkeepError::Internal("write queue dropped a job".into()))?
    }
}
