// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tab facade over the chatkeep store and lock manager.

pub mod notifier;
pub mod session;

pub use notifier::SaveFailureNotifier;
pub use session::{ImportSummary, TabSession};
