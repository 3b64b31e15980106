//! Append statistics
//!
//! Lock-free counters updated on every append, readable at any time through a
//! plain snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

/// 64-byte aligned so neighbouring counters do not share a cache line
#[repr(align(64))]
struct AlignedCounter(AtomicU64);

impl AlignedCounter {
    fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    #[inline]
    fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    #[inline]
    fn load(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters shared by one appender
pub struct AppendStats {
    /// `append` calls that carried rows
    calls: AlignedCounter,
    /// Rows accepted by the server
    rows: AlignedCounter,
    /// Upload + insert requests dispatched
    requests: AlignedCounter,
    /// Requests that failed
    failures: AlignedCounter,
}

/// Point-in-time copy of [`AppendStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendStatsSnapshot {
    pub calls: u64,
    pub rows: u64,
    pub requests: u64,
    pub failures: u64,
}

impl Default for AppendStats {
    fn default() -> Self {
        Self::new()
    }
}

impl AppendStats {
    pub fn new() -> Self {
        Self {
            calls: AlignedCounter::new(),
            rows: AlignedCounter::new(),
            requests: AlignedCounter::new(),
            failures: AlignedCounter::new(),
        }
    }

    #[inline]
    pub(crate) fn record_call(&self) {
        self.calls.add(1);
    }

    #[inline]
    pub(crate) fn record_request(&self, rows: usize) {
        self.requests.add(1);
        self.rows.add(rows as u64);
    }

    #[inline]
    pub(crate) fn record_failure(&self) {
        self.requests.add(1);
        self.failures.add(1);
    }

    pub fn snapshot(&self) -> AppendStatsSnapshot {
        AppendStatsSnapshot {
            calls: self.calls.load(),
            rows: self.rows.load(),
            requests: self.requests.load(),
            failures: self.failures.load(),
        }
    }
}

impl std::fmt::Debug for AppendStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.snapshot().fmt(f)
    }
}
