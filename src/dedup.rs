// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Short-lived duplicate suppression.
//!
//! When an announcement reaches the relay via two paths at once (the
//! tunnel and a local broadcast, or two bridged segments), only the
//! first copy within the window may be re-emitted; otherwise the
//! copies echo between sites indefinitely. The key is the source UDP
//! port alone, which is coarse on purpose: ephemeral ports make
//! collisions between distinct devices inside 100 ms unlikely, and a
//! lost race costs at most one extra duplicate.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// How long a source port suppresses further spoofed emissions.
pub const DEDUP_WINDOW: Duration = Duration::from_millis(100);

/// Concurrent source-port -> arrival-time window shared by all
/// listener workers and the tunnel worker.
#[derive(Debug, Default)]
pub struct DedupWindow {
    entries: DashMap<u16, Instant>,
}

impl DedupWindow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prune expired entries, then report whether `port` is already
    /// inside the window. If it is not, record it now.
    ///
    /// Returns `true` when the caller must suppress the emission.
    /// The prune/check/record sequence is not atomic as a whole; two
    /// workers racing on the same port may both get `false`, which the
    /// forwarding policy tolerates.
    pub fn check_and_record(&self, port: u16) -> bool {
        let now = Instant::now();
        self.entries
            .retain(|_, seen| now.duration_since(*seen) <= DEDUP_WINDOW);

        if self.entries.contains_key(&port) {
            return true;
        }
        self.entries.insert(port, now);
        false
    }

    /// Number of live entries (pruning happens on use, not here).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
