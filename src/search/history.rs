//! Stored searches, so a later refinement can start from the same query.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::catalog::SearchFilters;
use crate::error::ProviderResult;

/// Default number of searches an [`InMemorySearchHistory`] keeps.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

/// Everything needed to re-run or refine a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    /// Text the user typed, when the search had a text part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_text: Option<String>,
    pub query_embedding: Vec<f32>,
    pub filters: SearchFilters,
    pub limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Search this one refines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub result_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A query text and how many stored searches used it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryCount {
    pub text: String,
    pub count: usize,
}

/// Persistence for [`SearchRecord`]s.
pub trait SearchHistory: Send + Sync {
    /// Stores `record` and returns its new id.
    fn save(&self, record: SearchRecord) -> ProviderResult<String>;

    fn get(&self, search_id: &str) -> ProviderResult<Option<SearchRecord>>;

    /// Distinct query texts across all users, most searched first.
    fn popular_queries(&self) -> ProviderResult<Vec<QueryCount>>;

    /// Distinct query texts of `user_id`, most recent first.
    fn user_queries(&self, user_id: &str) -> ProviderResult<Vec<String>>;
}

/// Process-local history holding the most recent `capacity` searches.
///
/// Ids are `search_{n}` with `n` counting up from one; saving search `n`
/// forgets search `n - capacity`.
#[derive(Debug)]
pub struct InMemorySearchHistory {
    records: DashMap<u64, SearchRecord>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Default for InMemorySearchHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl InMemorySearchHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A history keeping at most `capacity` searches (minimum one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: DashMap::new(),
            next_id: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Query texts with their sequence numbers, newest first.
    fn texts_newest_first(&self, user_id: Option<&str>) -> Vec<(u64, String)> {
        let mut texts: Vec<(u64, String)> = self
            .records
            .iter()
            .filter(|entry| user_id.is_none_or(|user| entry.user_id.as_deref() == Some(user)))
            .filter_map(|entry| {
                let text = entry.query_text.as_deref()?.trim();
                (!text.is_empty()).then(|| (*entry.key(), text.to_string()))
            })
            .collect();
        texts.sort_by(|a, b| b.0.cmp(&a.0));
        texts
    }
}

fn parse_id(search_id: &str) -> Option<u64> {
    search_id.strip_prefix("search_")?.parse().ok()
}

impl SearchHistory for InMemorySearchHistory {
    fn save(&self, record: SearchRecord) -> ProviderResult<String> {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.records.insert(n, record);
        if let Some(expired) = n.checked_sub(self.capacity as u64) {
            self.records.remove(&expired);
        }
        Ok(format!("search_{n}"))
    }

    fn get(&self, search_id: &str) -> ProviderResult<Option<SearchRecord>> {
        Ok(parse_id(search_id)
            .and_then(|n| self.records.get(&n))
            .map(|r| r.value().clone()))
    }

    fn popular_queries(&self) -> ProviderResult<Vec<QueryCount>> {
        // Keyed by lowercase text; the newest spelling is the one shown.
        let mut counts: HashMap<String, QueryCount> = HashMap::new();
        for (_, text) in self.texts_newest_first(None) {
            counts
                .entry(text.to_lowercase())
                .or_insert_with(|| QueryCount { text, count: 0 })
                .count += 1;
        }

        let mut popular: Vec<QueryCount> = counts.into_values().collect();
        popular.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.text.cmp(&b.text)));
        Ok(popular)
    }

    fn user_queries(&self, user_id: &str) -> ProviderResult<Vec<String>> {
        let mut seen = HashSet::new();
        Ok(self
            .texts_newest_first(Some(user_id))
            .into_iter()
            .filter(|(_, text)| seen.insert(text.to_lowercase()))
            .map(|(_, text)| text)
            .collect())
    }
}
