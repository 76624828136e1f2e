//! Personalization and trending signals consumed by the ranking pipeline.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;
use crate::vector::VectorIndex;

/// A user's stated or learned taste profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub preferred_brands: Vec<String>,
    #[serde(default)]
    pub preferred_categories: Vec<String>,
    #[serde(default)]
    pub preferred_styles: Vec<String>,
}

/// Source of per-user preference profiles.
pub trait PreferenceProvider: Send + Sync {
    /// Profile for `user_id`, or `None` when the user has none.
    fn user_preferences(&self, user_id: &str) -> ProviderResult<Option<UserPreferences>>;
}

/// Source of the current trending product set.
pub trait TrendingProvider: Send + Sync {
    fn trending_ids(&self) -> ProviderResult<HashSet<String>>;
}

/// Provider for deployments without user profiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPreferences;

impl PreferenceProvider for NoPreferences {
    fn user_preferences(&self, _user_id: &str) -> ProviderResult<Option<UserPreferences>> {
        Ok(None)
    }
}

/// Fixed in-memory profiles.
#[derive(Debug, Clone, Default)]
pub struct StaticPreferences {
    profiles: HashMap<String, UserPreferences>,
}

impl StaticPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: impl Into<String>, preferences: UserPreferences) -> Self {
        self.profiles.insert(user_id.into(), preferences);
        self
    }
}

impl PreferenceProvider for StaticPreferences {
    fn user_preferences(&self, user_id: &str) -> ProviderResult<Option<UserPreferences>> {
        Ok(self.profiles.get(user_id).cloned())
    }
}

/// Fixed trending set.
#[derive(Debug, Clone, Default)]
pub struct StaticTrending {
    ids: HashSet<String>,
}

impl StaticTrending {
    pub fn new<S: Into<String>>(ids: impl IntoIterator<Item = S>) -> Self {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

impl TrendingProvider for StaticTrending {
    fn trending_ids(&self) -> ProviderResult<HashSet<String>> {
        Ok(self.ids.clone())
    }
}

/// Trending set derived from the indexed catalog: every live product whose
/// `trending_score` reaches the threshold.
#[derive(Debug, Clone)]
pub struct CatalogTrending {
    index: Arc<VectorIndex>,
    threshold: f32,
}

impl CatalogTrending {
    pub fn new(index: Arc<VectorIndex>, threshold: f32) -> Self {
        Self { index, threshold }
    }
}

impl TrendingProvider for CatalogTrending {
    fn trending_ids(&self) -> ProviderResult<HashSet<String>> {
        Ok(self
            .index
            .products()
            .into_iter()
            .filter(|p| p.trending_score >= self.threshold)
            .map(|p| p.id.clone())
            .collect())
    }
}
