//! Read-through result cache keyed by a fingerprint of the fused query.
//!
//! Entries expire after a per-entry TTL. Catalog mutations do not invalidate
//! anything; a cached response may be stale for at most its TTL. The cache
//! holds at most `capacity` entries: a full cache first sweeps expired
//! entries, then drops the one closest to expiry.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::catalog::SearchFilters;
use crate::error::ProviderResult;
use crate::search::service::SearchResponse;

/// Store for complete search responses.
pub trait ResultCache: Send + Sync {
    fn get(&self, key: &str) -> ProviderResult<Option<SearchResponse>>;

    fn set(&self, key: &str, value: SearchResponse, ttl: Duration) -> ProviderResult<()>;
}

/// Search surface a cached response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Search,
    Similar,
}

impl Surface {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Similar => "similar",
        }
    }
}

/// Hex SHA-256 over everything that determines a ranked response.
pub fn fingerprint(
    surface: Surface,
    query: &[f32],
    filters: &SearchFilters,
    limit: usize,
    user_id: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(surface.as_str().as_bytes());
    hasher.update([0u8]);
    for value in query {
        hasher.update(value.to_le_bytes());
    }
    hasher.update([0u8]);
    // Struct field order is fixed, so the encoding is stable.
    hasher.update(serde_json::to_vec(filters).unwrap_or_default());
    hasher.update([0u8]);
    hasher.update((limit as u64).to_le_bytes());
    hasher.update(user_id.unwrap_or_default().as_bytes());

    let digest = hasher.finalize();
    let mut key = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(key, "{byte:02x}");
    }
    key
}

struct Entry {
    value: SearchResponse,
    expires_at: Instant,
}

/// Default bound on cached responses.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// In-memory [`ResultCache`] with lazy expiry and a capacity bound.
pub struct TtlCache {
    entries: DashMap<String, Entry>,
    capacity: usize,
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache holding at most `capacity` entries (minimum one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drops expired entries; returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let before = self.entries.len();
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            debug!(evicted, "Evicted expired cache entries");
        }
        evicted
    }

    /// Makes room for one new entry.
    fn reserve_slot(&self) {
        if self.entries.len() < self.capacity {
            return;
        }
        self.evict_expired();

        while self.entries.len() >= self.capacity {
            let soonest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().expires_at)
                .map(|entry| entry.key().clone());
            match soonest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl std::fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.entries.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl ResultCache for TtlCache {
    fn get(&self, key: &str) -> ProviderResult<Option<SearchResponse>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }

        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    fn set(&self, key: &str, value: SearchResponse, ttl: Duration) -> ProviderResult<()> {
        if !self.entries.contains_key(key) {
            self.reserve_slot();
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(id: &str) -> SearchResponse {
        SearchResponse {
            search_id: id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_set_then_get() {
        let cache = TtlCache::new();
        cache
            .set("k", response("search_1"), Duration::from_secs(60))
            .unwrap();
        assert_eq!(cache.get("k").unwrap().unwrap().search_id, "search_1");
        assert!(cache.get("other").unwrap().is_none());
    }

    #[test]
    fn test_expired_entries_miss_and_evict() {
        let cache = TtlCache::new();
        cache.set("gone", response("a"), Duration::ZERO).unwrap();
        cache
            .set("kept", response("b"), Duration::from_secs(60))
            .unwrap();

        assert!(cache.get("gone").unwrap().is_none());
        cache.set("gone", response("a"), Duration::ZERO).unwrap();
        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_full_cache_sweeps_expired_entries_first() {
        let cache = TtlCache::with_capacity(2);
        cache.set("stale", response("a"), Duration::ZERO).unwrap();
        cache
            .set("fresh", response("b"), Duration::from_secs(60))
            .unwrap();
        cache
            .set("new", response("c"), Duration::from_secs(60))
            .unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.get("fresh").unwrap().is_some());
        assert!(cache.get("new").unwrap().is_some());
    }

    #[test]
    fn test_full_cache_drops_soonest_expiry() {
        let cache = TtlCache::with_capacity(2);
        cache
            .set("short", response("a"), Duration::from_secs(10))
            .unwrap();
        cache
            .set("long", response("b"), Duration::from_secs(600))
            .unwrap();
        cache
            .set("short", response("a2"), Duration::from_secs(10))
            .unwrap();
        assert_eq!(cache.len(), 2);

        cache
            .set("third", response("c"), Duration::from_secs(300))
            .unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.get("short").unwrap().is_none());
        assert!(cache.get("long").unwrap().is_some());
        assert!(cache.get("third").unwrap().is_some());
    }

    #[test]
    fn test_fingerprint_distinguishes_inputs() {
        let filters = SearchFilters::default();
        let q = [0.6, 0.8];
        let base = fingerprint(Surface::Search, &q, &filters, 20, None);

        assert_eq!(base, fingerprint(Surface::Search, &q, &filters, 20, None));
        assert_eq!(base.len(), 64);
        assert_ne!(base, fingerprint(Surface::Similar, &q, &filters, 20, None));
        assert_ne!(base, fingerprint(Surface::Search, &q, &filters, 10, None));
        assert_ne!(base, fingerprint(Surface::Search, &q, &filters, 20, Some("u1")));
        assert_ne!(
            base,
            fingerprint(
                Surface::Search,
                &q,
                &SearchFilters::default().with_brands(["Zara"]),
                20,
                None
            )
        );
        assert_ne!(base, fingerprint(Surface::Search, &[0.8, 0.6], &filters, 20, None));
    }
}
