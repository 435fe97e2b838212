//! Statistics tracking for the filter.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::dispatcher::Outcome;

/// Atomic per-outcome packet counters.
pub struct Stats {
    pub packets: AtomicU64,
    pub passthrough: AtomicU64,
    pub undecodable: AtomicU64,
    pub duplicates: AtomicU64,
    pub requests_allowed: AtomicU64,
    pub requests_unmatched: AtomicU64,
    pub requests_blocked: AtomicU64,
    pub responses_accepted: AtomicU64,
    pub responses_blocked: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            packets: AtomicU64::new(0),
            passthrough: AtomicU64::new(0),
            undecodable: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            requests_allowed: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
            requests_blocked: AtomicU64::new(0),
            responses_accepted: AtomicU64::new(0),
            responses_blocked: AtomicU64::new(0),
        }
    }

    pub fn record(&self, outcome: &Outcome) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            Outcome::PassThrough => &self.passthrough,
            Outcome::Undecodable(_) => &self.undecodable,
            Outcome::Duplicate => &self.duplicates,
            Outcome::Allowed => &self.requests_allowed,
            Outcome::Unmatched => &self.requests_unmatched,
            Outcome::Blocked => &self.requests_blocked,
            Outcome::ResponseAccepted => &self.responses_accepted,
            Outcome::ResponseBlocked => &self.responses_blocked,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets: self.packets.swap(0, Ordering::Relaxed),
            passthrough: self.passthrough.swap(0, Ordering::Relaxed),
            undecodable: self.undecodable.swap(0, Ordering::Relaxed),
            duplicates: self.duplicates.swap(0, Ordering::Relaxed),
            requests_allowed: self.requests_allowed.swap(0, Ordering::Relaxed),
            requests_unmatched: self.requests_unmatched.swap(0, Ordering::Relaxed),
            requests_blocked: self.requests_blocked.swap(0, Ordering::Relaxed),
            responses_accepted: self.responses_accepted.swap(0, Ordering::Relaxed),
            responses_blocked: self.responses_blocked.swap(0, Ordering::Relaxed),
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub packets: u64,
    pub passthrough: u64,
    pub undecodable: u64,
    pub duplicates: u64,
    pub requests_allowed: u64,
    pub requests_unmatched: u64,
    pub requests_blocked: u64,
    pub responses_accepted: u64,
    pub responses_blocked: u64,
}

impl StatsSnapshot {
    pub fn dropped(&self) -> u64 {
        self.requests_blocked + self.responses_blocked
    }
}
