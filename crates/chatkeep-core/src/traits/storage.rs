// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation storage adapter trait.

use async_trait::async_trait;

use crate::error::ChatkeepError;
use crate::types::{HealthStatus, LoadedState, SaveRequest, SaveReport};

/// Persistence for one tab's view of the conversation set.
#[async_trait]
pub trait StorageAdapter: Send + Sync + 'static {
    /// Human-readable adapter name, for logs.
    fn name(&self) -> &str;

    /// Reports whether the backing store is reachable.
    async fn health_check(&self) -> Result<HealthStatus, ChatkeepError>;

    /// Load the conversation set and this tab's current pointer.
    ///
    /// Never fails: an unreachable or corrupted store degrades to
    /// [`LoadSource::Empty`](crate::types::LoadSource::Empty).
    async fn load(&self) -> LoadedState;

    /// Merge the proposed set into the persisted one and write the result.
    async fn save(&self, request: SaveRequest) -> Result<SaveReport, ChatkeepError>;

    /// Persist only this tab's current-conversation pointer.
    async fn save_current_id(&self, id: Option<String>) -> Result<(), ChatkeepError>;

    /// Remove the conversation set and this tab's pointer.
    async fn clear(&self) -> Result<(), ChatkeepError>;
}
