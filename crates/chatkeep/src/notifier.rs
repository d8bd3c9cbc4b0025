// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! De-duplicated reporting of save failures.

use std::sync::Mutex;

use chatkeep_core::ChatkeepError;
use tracing::{error, info};

/// Reports a failed save once per distinct failure.
///
/// The same failure repeating is reported only the first time; a different
/// failure, or the same one after a successful save, is reported again.
#[derive(Debug, Default)]
pub struct SaveFailureNotifier {
    last: Mutex<Option<String>>,
}

impl SaveFailureNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn signature(err: &ChatkeepError) -> String {
        format!("{}:{err}", err.kind())
    }

    /// Record a failure. Returns the notice to show, or `None` when this
    /// failure was already reported.
    pub fn failed(&self, err: &ChatkeepError) -> Option<String> {
        let signature = Self::signature(err);
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        if last.as_deref() == Some(signature.as_str()) {
            return None;
        }
        *last = Some(signature);
        error!(kind = err.kind(), error = %err, "conversations could not be saved");
        Some(format!("Conversations could not be saved: {err}"))
    }

    /// Record a success, re-arming notifications.
    pub fn succeeded(&self) {
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        if last.take().is_some() {
            info!("saving conversations works again");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeats_are_suppressed_until_success() {
        let notifier = SaveFailureNotifier::new();
        let full = ChatkeepError::StoreUnavailable("disk full".into());

        assert!(notifier.failed(&full).is_some());
        assert!(notifier.failed(&full).is_none());

        let other = ChatkeepError::Internal("boom".into());
        assert!(notifier.failed(&other).unwrap().contains("boom"));

        notifier.succeeded();
        assert!(notifier.failed(&other).is_some());
    }
}
