// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process publish/subscribe channel for lock state changes.
//!
//! Events from other processes reach a bus through a relay that replays the
//! shared event journal; the bus's `origin` lets the relay skip events this
//! bus already delivered.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chatkeep_core::{LockEvent, create_id};
use tokio::sync::broadcast;
use tracing::trace;

/// Fan-out of [`LockEvent`]s to every subscribed tab.
///
/// Cloning yields another handle to the same channel, so managers built
/// from clones of one bus see each other's events.
#[derive(Debug, Clone)]
pub struct LockEventBus {
    sender: broadcast::Sender<LockEvent>,
    origin: Arc<str>,
    relayed: Arc<AtomicBool>,
}

impl LockEventBus {
    /// Create a bus buffering up to `capacity` events per slow subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            origin: Arc::from(create_id()),
            relayed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Identity of this bus in the shared event journal.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Returns `true` for exactly one caller per bus, which then owns the
    /// relay feeding it foreign events.
    pub fn claim_relay(&self) -> bool {
        !self.relayed.swap(true, Ordering::AcqRel)
    }

    /// Give up the relay claim so the next [`claim_relay`](Self::claim_relay) succeeds.
    pub fn release_relay(&self) {
        self.relayed.store(false, Ordering::Release);
    }

    /// Deliver `event` to current subscribers. Having none is not an error.
    pub fn publish(&self, event: LockEvent) {
        match self.sender.send(event) {
            Ok(receivers) => trace!(receivers, "lock event published"),
            Err(_) => trace!("lock event dropped, no subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LockEvent> {
        self.sender.subscribe()
    }
}

impl Default for LockEventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
