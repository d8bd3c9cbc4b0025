// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identifier generation.
//!
//! Identifiers are canonical hyphenated UUID v4 strings. Uniqueness is
//! probabilistic; nothing in the store enforces it structurally, which is why
//! the repair pass re-checks ids on every load.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use tracing::debug;

static FALLBACK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Create a new random identifier.
///
/// Draws 128 bits from the operating system's secure random source. If that
/// source is unavailable, falls back to a seeded pseudo-random generator that
/// produces an identifier of the same shape.
pub fn create_id() -> String {
    let mut bytes = [0u8; 16];
    match OsRng.try_fill_bytes(&mut bytes) {
        Ok(()) => uuid::Builder::from_random_bytes(bytes)
            .into_uuid()
            .to_string(),
        Err(e) => {
            debug!(error = %e, "secure random source unavailable, using fallback id");
            fallback_id()
        }
    }
}

/// Pseudo-random identifier seeded from wall time, a process-wide counter and the pid.
fn fallback_id() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    let counter = FALLBACK_COUNTER.fetch_add(1, Ordering::Relaxed);
    let seed = nanos ^ counter.rotate_left(32) ^ u64::from(std::process::id());

    let mut bytes = [0u8; 16];
    StdRng::seed_from_u64(seed).fill_bytes(&mut bytes);
    uuid::Builder::from_random_bytes(bytes)
        .into_uuid()
        .to_string()
}
