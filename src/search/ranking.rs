//! Ranking pipeline: filter, personalize, trend boost, finalize.
//!
//! The two middle stages consult collaborators. When one fails the stage is
//! skipped, the failure is recorded as a [`DegradedStage`] and ranking goes on
//! with the list as it was.

use std::cmp::Reverse;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::{ProductRecord, SearchFilters, contains_ignore_case, overlap_count_ignore_case};
use crate::error::ProviderError;
use crate::search::signals::{PreferenceProvider, TrendingProvider, UserPreferences};
use crate::vector::{SearchHit, Slot};

/// Scores closer than this are treated as equal when ordering.
const SCORE_RESOLUTION: f64 = 1e-6;

/// Additive bonuses applied by the personalization and trending stages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingWeights {
    pub brand_bonus: f32,
    pub category_bonus: f32,
    /// Applied once per overlapping style.
    pub style_bonus: f32,
    pub trending_bonus: f32,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            brand_bonus: 0.2,
            category_bonus: 0.15,
            style_bonus: 0.1,
            trending_bonus: 0.1,
        }
    }
}

/// Pipeline step that can fall back when a collaborator fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Personalization,
    Trending,
    Cache,
    Social,
    History,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Personalization => "personalization",
            Self::Trending => "trending",
            Self::Cache => "cache",
            Self::Social => "social",
            Self::History => "history",
        };
        f.write_str(name)
    }
}

/// A stage that fell back, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradedStage {
    pub stage: Stage,
    pub reason: String,
}

impl DegradedStage {
    pub fn new(stage: Stage, error: &ProviderError) -> Self {
        Self {
            stage,
            reason: error.to_string(),
        }
    }
}

/// A ranked product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub product: ProductRecord,
    /// Cosine similarity to the query, in [-1, 1].
    pub similarity_score: f32,
    /// Similarity plus ranking bonuses; absent when no bonus applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjusted_score: Option<f32>,
    #[serde(skip)]
    pub slot: Slot,
}

impl SearchResult {
    /// Score the result was ordered by.
    pub fn final_score(&self) -> f32 {
        self.adjusted_score.unwrap_or(self.similarity_score)
    }
}

/// Output of a ranking pass.
#[derive(Debug, Clone, Default)]
pub struct Ranked {
    pub results: Vec<SearchResult>,
    pub degraded: Vec<DegradedStage>,
}

/// What to rank for.
#[derive(Debug, Clone, Copy)]
pub struct RankingRequest<'a> {
    pub filters: &'a SearchFilters,
    pub user_id: Option<&'a str>,
    pub limit: usize,
}

struct Candidate {
    hit: SearchHit,
    score: f32,
}

/// Orders raw similarity hits into the final result list.
pub struct RankingPipeline {
    weights: RankingWeights,
    preferences: Arc<dyn PreferenceProvider>,
    trending: Arc<dyn TrendingProvider>,
}

impl RankingPipeline {
    pub fn new(
        weights: RankingWeights,
        preferences: Arc<dyn PreferenceProvider>,
        trending: Arc<dyn TrendingProvider>,
    ) -> Self {
        Self {
            weights,
            preferences,
            trending,
        }
    }

    pub fn weights(&self) -> RankingWeights {
        self.weights
    }

    /// Runs every stage over `hits`, which must be in scan order.
    pub fn rank(&self, hits: Vec<SearchHit>, request: RankingRequest<'_>) -> Ranked {
        let mut degraded = Vec::new();
        let total = hits.len();

        let mut candidates: Vec<Candidate> = hits
            .into_iter()
            .filter(|hit| request.filters.matches(&hit.product))
            .map(|hit| Candidate {
                score: hit.score,
                hit,
            })
            .collect();
        debug!(total, kept = candidates.len(), "Applied search filters");

        if let Some(user_id) = request.user_id {
            match self.preferences.user_preferences(user_id) {
                Ok(Some(preferences)) => self.personalize(&mut candidates, &preferences),
                Ok(None) => debug!(user_id, "No preference profile, skipping personalization"),
                Err(e) => {
                    warn!(user_id, error = %e, "Personalization unavailable, keeping similarity order");
                    degraded.push(DegradedStage::new(Stage::Personalization, &e));
                }
            }
        }

        match self.trending.trending_ids() {
            Ok(trending) => {
                for candidate in candidates
                    .iter_mut()
                    .filter(|c| trending.contains(&c.hit.id))
                {
                    candidate.score += self.weights.trending_bonus;
                }
            }
            Err(e) => {
                warn!(error = %e, "Trending signal unavailable, skipping boost");
                degraded.push(DegradedStage::new(Stage::Trending, &e));
            }
        }

        Ranked {
            results: finalize(candidates, request.limit),
            degraded,
        }
    }

    fn personalize(&self, candidates: &mut [Candidate], preferences: &UserPreferences) {
        for candidate in candidates.iter_mut() {
            let product = &candidate.hit.product;
            let mut bonus = 0.0;

            if contains_ignore_case(&preferences.preferred_brands, &product.brand) {
                bonus += self.weights.brand_bonus;
            }
            if contains_ignore_case(&preferences.preferred_categories, &product.category) {
                bonus += self.weights.category_bonus;
            }
            let styles = overlap_count_ignore_case(&preferences.preferred_styles, &product.styles);
            bonus += styles as f32 * self.weights.style_bonus;

            candidate.score += bonus;
        }
    }
}

/// Sorts by score descending, equal scores by ascending slot, and truncates.
fn finalize(mut candidates: Vec<Candidate>, limit: usize) -> Vec<SearchResult> {
    candidates.sort_by_key(|c| (Reverse(quantize(c.score)), c.hit.slot));
    candidates.truncate(limit);

    candidates
        .into_iter()
        .map(|c| {
            let adjusted = (c.score != c.hit.score).then_some(c.score);
            SearchResult {
                product: ProductRecord::clone(&c.hit.product),
                similarity_score: c.hit.score,
                adjusted_score: adjusted,
                slot: c.hit.slot,
            }
        })
        .collect()
}

fn quantize(score: f32) -> i64 {
    (f64::from(score) / SCORE_RESOLUTION).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderResult;
    use crate::search::signals::{NoPreferences, StaticPreferences, StaticTrending};
    use std::collections::HashSet;

    struct FailingSignals;

    impl PreferenceProvider for FailingSignals {
        fn user_preferences(&self, _user_id: &str) -> ProviderResult<Option<UserPreferences>> {
            Err(ProviderError::new("preferences", "connection refused"))
        }
    }

    impl TrendingProvider for FailingSignals {
        fn trending_ids(&self) -> ProviderResult<HashSet<String>> {
            Err(ProviderError::new("trending", "timeout"))
        }
    }

    fn hit(id: &str, slot: u32, score: f32, brand: &str) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            slot: Slot::new(slot),
            score,
            product: Arc::new(
                ProductRecord::new(id)
                    .with_brand(brand)
                    .with_category("dresses")
                    .with_price(60.0 + slot as f64 * 20.0)
                    .with_styles(["casual"]),
            ),
        }
    }

    /// A(0.9) at slot 0, B(0.7) at slot 1, C(0.5) at slot 2.
    fn abc() -> Vec<SearchHit> {
        vec![
            hit("A", 0, 0.9, "Zara"),
            hit("B", 1, 0.7, "Mango"),
            hit("C", 2, 0.5, "COS"),
        ]
    }

    fn pipeline(
        preferences: impl PreferenceProvider + 'static,
        trending: impl TrendingProvider + 'static,
    ) -> RankingPipeline {
        RankingPipeline::new(
            RankingWeights::default(),
            Arc::new(preferences),
            Arc::new(trending),
        )
    }

    fn ids(ranked: &Ranked) -> Vec<&str> {
        ranked.results.iter().map(|r| r.product.id.as_str()).collect()
    }

    fn request<'a>(
        filters: &'a SearchFilters,
        user_id: Option<&'a str>,
        limit: usize,
    ) -> RankingRequest<'a> {
        RankingRequest {
            filters,
            user_id,
            limit,
        }
    }

    fn mango_fan() -> StaticPreferences {
        StaticPreferences::new().with_user(
            "u1",
            UserPreferences {
                preferred_brands: vec!["mango".to_string()],
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_similarity_order_without_signals() {
        let filters = SearchFilters::default();
        let ranked = pipeline(NoPreferences, StaticTrending::default())
            .rank(abc(), request(&filters, None, 2));

        assert_eq!(ids(&ranked), vec!["A", "B"]);
        assert!(ranked.degraded.is_empty());
        assert_eq!(ranked.results[0].adjusted_score, None);
    }

    #[test]
    fn test_personalized_tie_resolved_by_slot() {
        let filters = SearchFilters::default();
        let ranked = pipeline(mango_fan(), StaticTrending::default())
            .rank(abc(), request(&filters, Some("u1"), 3));

        // B: 0.7 + 0.2 ties A's 0.9; A was inserted first.
        assert_eq!(ids(&ranked), vec!["A", "B", "C"]);
        assert!((ranked.results[1].final_score() - 0.9).abs() < 1e-6);
        assert_eq!(ranked.results[1].similarity_score, 0.7);
    }

    #[test]
    fn test_tie_prefers_earlier_slot_regardless_of_input_order() {
        let filters = SearchFilters::default();
        let mut hits = abc();
        hits.swap(0, 1);
        hits[0].slot = Slot::new(0);
        hits[1].slot = Slot::new(1);

        let ranked = pipeline(mango_fan(), StaticTrending::default())
            .rank(hits, request(&filters, Some("u1"), 2));
        assert_eq!(ids(&ranked), vec!["B", "A"]);
    }

    #[test]
    fn test_bonuses_stack() {
        let filters = SearchFilters::default();
        let preferences = StaticPreferences::new().with_user(
            "u1",
            UserPreferences {
                preferred_brands: vec!["COS".to_string()],
                preferred_categories: vec!["Dresses".to_string()],
                preferred_styles: vec!["casual".to_string()],
            },
        );
        let ranked = pipeline(preferences, StaticTrending::new(["C"]))
            .rank(abc(), request(&filters, Some("u1"), 3));

        // Every product matches category and style (+0.25).
        // A: 0.9 + 0.25 = 1.15, B: 0.7 + 0.25 = 0.95,
        // C: 0.5 + 0.2 (brand) + 0.25 + 0.1 (trending) = 1.05
        assert_eq!(ids(&ranked), vec!["A", "C", "B"]);
        assert!((ranked.results[1].final_score() - 1.05).abs() < 1e-5);
    }

    #[test]
    fn test_brand_preference_ignores_non_ascii_case() {
        let filters = SearchFilters::default();
        let preferences = StaticPreferences::new().with_user(
            "u1",
            UserPreferences {
                preferred_brands: vec!["HERMÈS".to_string()],
                ..Default::default()
            },
        );
        let hits = vec![hit("A", 0, 0.6, "Zara"), hit("H", 1, 0.5, "Hermès")];
        let ranked = pipeline(preferences, StaticTrending::default())
            .rank(hits, request(&filters, Some("u1"), 2));

        assert_eq!(ids(&ranked), vec!["H", "A"]);
        assert!((ranked.results[0].final_score() - 0.7).abs() < 1e-5);
    }

    #[test]
    fn test_filters_run_before_truncation() {
        let filters = SearchFilters::default().with_price_range(Some(70.0), None);
        let ranked = pipeline(NoPreferences, StaticTrending::default())
            .rank(abc(), request(&filters, None, 2));
        assert_eq!(ids(&ranked), vec!["B", "C"]);
    }

    #[test]
    fn test_failed_collaborators_degrade() {
        let filters = SearchFilters::default();
        let ranked = RankingPipeline::new(
            RankingWeights::default(),
            Arc::new(FailingSignals),
            Arc::new(FailingSignals),
        )
        .rank(abc(), request(&filters, Some("u1"), 3));

        assert_eq!(ids(&ranked), vec!["A", "B", "C"]);
        let stages: Vec<Stage> = ranked.degraded.iter().map(|d| d.stage).collect();
        assert_eq!(stages, vec![Stage::Personalization, Stage::Trending]);
    }

    #[test]
    fn test_output_sorted_descending() {
        let filters = SearchFilters::default();
        let ranked = pipeline(mango_fan(), StaticTrending::new(["C"]))
            .rank(abc(), request(&filters, Some("u1"), 10));
        for pair in ranked.results.windows(2) {
            assert!(pair[0].final_score() >= pair[1].final_score() - 1e-6);
        }
    }
}
