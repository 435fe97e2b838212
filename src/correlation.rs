//! Cross-packet state for the filter.
//!
//! Two bounded LRU sets: request keys already adjudicated, and names whose
//! requests were dropped. The second one lets a response be dropped when it
//! resolves a name that was blocked at request time, whichever flow carries
//! it.

use std::net::IpAddr;
use std::num::NonZeroUsize;

use lru::LruCache;
use rustc_hash::FxBuildHasher;

pub const DEFAULT_DEDUP_CAPACITY: usize = 1000;
pub const DEFAULT_BLOCKED_CAPACITY: usize = 10_000;

/// Identity of a logical request for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub source: IpAddr,
    pub name: String,
    pub qtype: u16,
}

impl RequestKey {
    pub fn new(source: IpAddr, name: &str, qtype: u16) -> Self {
        Self {
            source,
            name: name.to_string(),
            qtype,
        }
    }
}

/// Dedup window and request-time blocklist.
///
/// Both sets evict their least recently used entry when full. Names are
/// compared case-insensitively.
pub struct CorrelationStore {
    seen: LruCache<RequestKey, (), FxBuildHasher>,
    blocked: LruCache<String, (), FxBuildHasher>,
}

impl CorrelationStore {
    pub fn new(dedup_capacity: NonZeroUsize, blocked_capacity: NonZeroUsize) -> Self {
        Self {
            seen: LruCache::with_hasher(dedup_capacity, FxBuildHasher),
            blocked: LruCache::with_hasher(blocked_capacity, FxBuildHasher),
        }
    }

    /// Build a store from plain capacities; zero is raised to one.
    pub fn with_capacities(dedup_capacity: usize, blocked_capacity: usize) -> Self {
        Self::new(non_zero(dedup_capacity), non_zero(blocked_capacity))
    }

    /// Record `key`, returning whether it was already present.
    ///
    /// A hit refreshes the key's recency; a miss inserts it, evicting the
    /// least recently seen key if the window is full.
    pub fn is_duplicate_and_record(&mut self, key: RequestKey) -> bool {
        if self.seen.get(&key).is_some() {
            return true;
        }
        self.seen.put(key, ());
        false
    }

    /// Remember that requests for `name` were dropped.
    pub fn record_blocked(&mut self, name: &str) {
        let name = name.to_ascii_lowercase();
        if self.blocked.get(&name).is_none() {
            self.blocked.put(name, ());
        }
    }

    /// Whether `name` was blocked at request time. Does not affect recency.
    pub fn is_blocked(&self, name: &str) -> bool {
        if name.bytes().any(|b| b.is_ascii_uppercase()) {
            self.blocked.contains(&name.to_ascii_lowercase())
        } else {
            self.blocked.contains(name)
        }
    }

    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    pub fn blocked_len(&self) -> usize {
        self.blocked.len()
    }
}

impl Default for CorrelationStore {
    fn default() -> Self {
        Self::with_capacities(DEFAULT_DEDUP_CAPACITY, DEFAULT_BLOCKED_CAPACITY)
    }
}

fn non_zero(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u32) -> RequestKey {
        RequestKey::new("10.0.0.1".parse().unwrap(), &format!("host{n}.com"), 1)
    }

    #[test]
    fn first_record_then_duplicate() {
        let mut store = CorrelationStore::default();

        assert!(!store.is_duplicate_and_record(key(1)));
        assert!(store.is_duplicate_and_record(key(1)));
        assert_eq!(store.seen_len(), 1);
    }

    #[test]
    fn key_components_are_distinct() {
        let mut store = CorrelationStore::default();
        let src: IpAddr = "10.0.0.1".parse().unwrap();
        let other: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(!store.is_duplicate_and_record(RequestKey::new(src, "a.com", 1)));
        assert!(!store.is_duplicate_and_record(RequestKey::new(other, "a.com", 1)));
        assert!(!store.is_duplicate_and_record(RequestKey::new(src, "a.com", 28)));
        assert!(!store.is_duplicate_and_record(RequestKey::new(src, "b.com", 1)));
        assert_eq!(store.seen_len(), 4);
    }

    #[test]
    fn dedup_window_evicts_least_recent_only() {
        let mut store = CorrelationStore::with_capacities(3, 10);

        store.is_duplicate_and_record(key(1));
        store.is_duplicate_and_record(key(2));
        store.is_duplicate_and_record(key(3));
        // Touch 1 so 2 becomes the oldest.
        assert!(store.is_duplicate_and_record(key(1)));
        store.is_duplicate_and_record(key(4));

        assert_eq!(store.seen_len(), 3);
        assert!(store.is_duplicate_and_record(key(1)));
        assert!(store.is_duplicate_and_record(key(3)));
        assert!(store.is_duplicate_and_record(key(4)));
        assert!(!store.is_duplicate_and_record(key(2)));
    }

    #[test]
    fn dedup_window_holds_default_capacity() {
        let mut store = CorrelationStore::default();

        for n in 0..DEFAULT_DEDUP_CAPACITY as u32 {
            assert!(!store.is_duplicate_and_record(key(n)));
        }
        assert_eq!(store.seen_len(), DEFAULT_DEDUP_CAPACITY);
        assert!(store.is_duplicate_and_record(key(0)));

        // One more key pushes out the oldest untouched entry, not everything.
        assert!(!store.is_duplicate_and_record(key(5000)));
        assert_eq!(store.seen_len(), DEFAULT_DEDUP_CAPACITY);
        assert!(store.is_duplicate_and_record(key(0)));
        assert!(!store.is_duplicate_and_record(key(1)));
    }

    #[test]
    fn record_blocked_is_idempotent() {
        let mut store = CorrelationStore::default();

        store.record_blocked("malicious.com");
        store.record_blocked("malicious.com");

        assert!(store.is_blocked("malicious.com"));
        assert_eq!(store.blocked_len(), 1);
    }

    #[test]
    fn blocked_names_ignore_case() {
        let mut store = CorrelationStore::default();

        store.record_blocked("MaLicious.com");

        assert!(store.is_blocked("malicious.com"));
        assert!(store.is_blocked("MALICIOUS.COM"));
        assert!(!store.is_blocked("malicious.net"));
    }

    #[test]
    fn blocked_names_are_bounded() {
        let mut store = CorrelationStore::with_capacities(10, 2);

        store.record_blocked("a.com");
        store.record_blocked("b.com");
        store.record_blocked("a.com");
        store.record_blocked("c.com");

        assert_eq!(store.blocked_len(), 2);
        assert!(store.is_blocked("a.com"));
        assert!(!store.is_blocked("b.com"));
        assert!(store.is_blocked("c.com"));
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut store = CorrelationStore::with_capacities(0, 0);

        assert!(!store.is_duplicate_and_record(key(1)));
        assert!(store.is_duplicate_and_record(key(1)));
        store.record_blocked("a.com");
        assert!(store.is_blocked("a.com"));
    }
}
