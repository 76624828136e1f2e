//! The search surface: text, image, combined, similar-product and refined
//! searches over a shared [`VectorIndex`].
//!
//! Each request embeds its modalities concurrently on blocking tasks, joins
//! them, fuses one query vector and hands scan plus ranking to the bounded
//! [`SearchWorkers`] pool. Responses are cached by query fingerprint and every
//! fresh search is stored in the search history for later refinement.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{ProductRecord, SearchFilters};
use crate::embedding::Embedder;
use crate::error::{EngineError, EngineResult};
use crate::search::cache::{self, DEFAULT_CACHE_CAPACITY, ResultCache, Surface, TtlCache};
use crate::search::feedback::{Feedback, FeedbackRefiner, FeedbackWeights};
use crate::search::fusion::{FusionInput, FusionWeights, Modality, QueryFusion};
use crate::search::history::{
    DEFAULT_HISTORY_CAPACITY, InMemorySearchHistory, SearchHistory, SearchRecord,
};
use crate::search::ranking::{
    DegradedStage, RankingPipeline, RankingRequest, RankingWeights, SearchResult, Stage,
};
use crate::search::signals::{CatalogTrending, NoPreferences, PreferenceProvider, TrendingProvider};
use crate::search::social::{SlugSocialResolver, SocialResolver};
use crate::search::workers::SearchWorkers;
use crate::vector::{Slot, VectorIndex};

/// Tunables of the search surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceOptions {
    pub fusion: FusionWeights,
    pub ranking: RankingWeights,
    pub feedback: FeedbackWeights,
    /// Products at or above this `trending_score` form the catalog trending set.
    pub trending_threshold: f32,
    pub default_limit: usize,
    pub max_limit: usize,
    pub cache_enabled: bool,
    pub search_ttl: Duration,
    pub similar_ttl: Duration,
    /// Bound on the default in-memory result cache.
    pub cache_capacity: usize,
    /// Bound on the default in-memory search history.
    pub history_capacity: usize,
    pub search_workers: usize,
    pub deadline: Option<Duration>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            fusion: FusionWeights::default(),
            ranking: RankingWeights::default(),
            feedback: FeedbackWeights::default(),
            trending_threshold: 0.7,
            default_limit: 20,
            max_limit: 100,
            cache_enabled: true,
            search_ttl: Duration::from_secs(3600),
            similar_ttl: Duration::from_secs(7200),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            search_workers: 0,
            deadline: None,
        }
    }
}

/// A ranked answer to one search call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResponse {
    /// History id; pass it to `refine_search`.
    pub search_id: String,
    pub products: Vec<SearchResult>,
    pub total_count: usize,
    pub search_time_ms: f64,
    pub query_embedding: Vec<f32>,
    /// Stages that fell back while answering.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<DegradedStage>,
    pub cached: bool,
}

/// A past query text offered while the user types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchSuggestion {
    pub text: String,
    /// Popular across all users rather than from the user's own history.
    pub trending: bool,
}

/// Suggestions returned when no limit is given.
pub const DEFAULT_SUGGESTION_LIMIT: usize = 10;

/// Inputs of a multi-modal search. At least one modality must be set.
#[derive(Debug, Clone, Default)]
pub struct CombinedQuery {
    pub text: Option<String>,
    /// Encoded image files.
    pub images: Vec<Vec<u8>>,
    pub social_url: Option<String>,
    pub filters: SearchFilters,
    pub limit: Option<usize>,
    pub user_id: Option<String>,
}

impl CombinedQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_image(mut self, image: Vec<u8>) -> Self {
        self.images.push(image);
        self
    }

    pub fn with_social_url(mut self, url: impl Into<String>) -> Self {
        self.social_url = Some(url.into());
        self
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

enum ModalInput {
    Text(String),
    Image(Vec<u8>),
    Social(String),
}

impl ModalInput {
    fn modality(&self) -> Modality {
        match self {
            Self::Text(_) => Modality::Text,
            Self::Image(_) => Modality::Image,
            Self::Social(_) => Modality::Social,
        }
    }
}

/// One modality after embedding. `vector` is `None` when the input was
/// dropped (an unresolvable social link).
struct Embedded {
    modality: Modality,
    vector: Option<Vec<f32>>,
    degraded: Option<DegradedStage>,
}

/// Parameters shared by every scan-and-rank path.
struct RankedSearch {
    surface: Surface,
    query_text: Option<String>,
    query: Vec<f32>,
    filters: SearchFilters,
    limit: usize,
    user_id: Option<String>,
    exclude: HashSet<String>,
    parent_id: Option<String>,
    use_cache: bool,
    degraded: Vec<DegradedStage>,
    started: Instant,
}

/// Builder for [`DiscoveryService`]; every collaborator has a default.
pub struct DiscoveryServiceBuilder {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    options: ServiceOptions,
    preferences: Option<Arc<dyn PreferenceProvider>>,
    trending: Option<Arc<dyn TrendingProvider>>,
    cache: Option<Arc<dyn ResultCache>>,
    history: Option<Arc<dyn SearchHistory>>,
    social: Option<Arc<dyn SocialResolver>>,
}

impl DiscoveryServiceBuilder {
    pub fn options(mut self, options: ServiceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn preferences(mut self, provider: Arc<dyn PreferenceProvider>) -> Self {
        self.preferences = Some(provider);
        self
    }

    pub fn trending(mut self, provider: Arc<dyn TrendingProvider>) -> Self {
        self.trending = Some(provider);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn history(mut self, history: Arc<dyn SearchHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn social(mut self, resolver: Arc<dyn SocialResolver>) -> Self {
        self.social = Some(resolver);
        self
    }

    pub fn build(self) -> EngineResult<DiscoveryService> {
        let options = self.options;
        if self.embedder.dimension() != self.index.dimension() {
            return Err(EngineError::Config {
                reason: format!(
                    "embedder produces {} dimensions but the index stores {}",
                    self.embedder.dimension().get(),
                    self.index.dimension().get()
                ),
            });
        }
        if options.max_limit == 0 || options.default_limit == 0 {
            return Err(EngineError::Config {
                reason: "result limits must be positive".to_string(),
            });
        }

        let preferences = self
            .preferences
            .unwrap_or_else(|| Arc::new(NoPreferences));
        let trending = self.trending.unwrap_or_else(|| {
            Arc::new(CatalogTrending::new(
                Arc::clone(&self.index),
                options.trending_threshold,
            ))
        });
        let cache = if options.cache_enabled {
            Some(
                self.cache
                    .unwrap_or_else(|| Arc::new(TtlCache::with_capacity(options.cache_capacity))),
            )
        } else {
            None
        };

        Ok(DiscoveryService {
            ranking: Arc::new(RankingPipeline::new(options.ranking, preferences, trending)),
            fusion: QueryFusion::new(options.fusion),
            refiner: FeedbackRefiner::new(options.feedback),
            workers: SearchWorkers::new(options.search_workers)?,
            history: self
                .history
                .unwrap_or_else(|| {
                    Arc::new(InMemorySearchHistory::with_capacity(options.history_capacity))
                }),
            social: self.social.unwrap_or_else(|| Arc::new(SlugSocialResolver)),
            index: self.index,
            embedder: self.embedder,
            cache,
            options,
        })
    }
}

/// Product discovery over one shared index.
pub struct DiscoveryService {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    fusion: QueryFusion,
    ranking: Arc<RankingPipeline>,
    refiner: FeedbackRefiner,
    cache: Option<Arc<dyn ResultCache>>,
    history: Arc<dyn SearchHistory>,
    social: Arc<dyn SocialResolver>,
    workers: SearchWorkers,
    options: ServiceOptions,
}

impl DiscoveryService {
    pub fn builder(index: Arc<VectorIndex>, embedder: Arc<dyn Embedder>) -> DiscoveryServiceBuilder {
        DiscoveryServiceBuilder {
            index,
            embedder,
            options: ServiceOptions::default(),
            preferences: None,
            trending: None,
            cache: None,
            history: None,
            social: None,
        }
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Embeds `products` in parallel and adds them in one batch.
    pub async fn ingest(&self, products: Vec<ProductRecord>) -> EngineResult<Vec<Slot>> {
        let embedder = Arc::clone(&self.embedder);
        let embedded = tokio::task::spawn_blocking(move || {
            products
                .into_par_iter()
                .map(|product| {
                    let vector = embedder.embed_product(&product);
                    (product, vector)
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| EngineError::WorkerUnavailable {
            reason: format!("embedding task failed: {e}"),
        })?;

        let index = Arc::clone(&self.index);
        self.workers
            .run(None, move || index.add_batch(embedded))
            .await
    }

    pub async fn text_search(
        &self,
        text: &str,
        filters: SearchFilters,
        limit: Option<usize>,
        user_id: Option<&str>,
    ) -> EngineResult<SearchResponse> {
        self.combined_search(CombinedQuery {
            text: Some(text.to_string()),
            filters,
            limit,
            user_id: user_id.map(str::to_string),
            ..Default::default()
        })
        .await
    }

    pub async fn image_search(
        &self,
        images: Vec<Vec<u8>>,
        filters: SearchFilters,
        limit: Option<usize>,
        user_id: Option<&str>,
    ) -> EngineResult<SearchResponse> {
        self.combined_search(CombinedQuery {
            images,
            filters,
            limit,
            user_id: user_id.map(str::to_string),
            ..Default::default()
        })
        .await
    }

    /// Searches with any mix of text, images and a social link.
    pub async fn combined_search(&self, query: CombinedQuery) -> EngineResult<SearchResponse> {
        let started = Instant::now();
        let limit = self.resolve_limit(query.limit)?;

        let mut inputs = Vec::new();
        let query_text = query
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        if let Some(text) = query.text.filter(|t| !t.trim().is_empty()) {
            inputs.push(ModalInput::Text(text));
        }
        inputs.extend(
            query
                .images
                .into_iter()
                .filter(|image| !image.is_empty())
                .map(ModalInput::Image),
        );
        if let Some(url) = query.social_url.filter(|u| !u.trim().is_empty()) {
            inputs.push(ModalInput::Social(url));
        }
        if inputs.is_empty() {
            return Err(EngineError::NoInput);
        }

        let embedded = self.embed_all(inputs).await;
        let mut degraded = Vec::new();
        let mut fusion_inputs = Vec::new();
        for item in embedded {
            degraded.extend(item.degraded);
            if let Some(vector) = item.vector {
                fusion_inputs.push(self.fusion.input(item.modality, vector));
            }
        }
        if fusion_inputs.is_empty() {
            return Err(EngineError::invalid_input(
                "the social link could not be resolved and no other input was given",
            ));
        }

        let fused = self.fusion.fuse(fusion_inputs)?;
        self.search_ranked(RankedSearch {
            surface: Surface::Search,
            query_text,
            query: fused,
            filters: query.filters,
            limit,
            user_id: query.user_id,
            exclude: HashSet::new(),
            parent_id: None,
            use_cache: true,
            degraded,
            started,
        })
        .await
    }

    /// Products closest to `product_id`, excluding the product itself.
    pub async fn similar_products(
        &self,
        product_id: &str,
        limit: Option<usize>,
        user_id: Option<&str>,
    ) -> EngineResult<SearchResponse> {
        let started = Instant::now();
        let limit = self.resolve_limit(limit)?;
        let query = self.index.reconstruct(product_id)?;

        self.search_ranked(RankedSearch {
            surface: Surface::Similar,
            query_text: None,
            query,
            filters: SearchFilters::default(),
            limit,
            user_id: user_id.map(str::to_string),
            exclude: HashSet::from([product_id.to_string()]),
            parent_id: None,
            use_cache: true,
            degraded: Vec::new(),
            started,
        })
        .await
    }

    /// Re-runs a stored search with its query moved by `feedback`.
    ///
    /// The refined search keeps the original filters, limit and user, and is
    /// stored under a new id linked to `search_id`.
    pub async fn refine_search(
        &self,
        search_id: &str,
        feedback: &Feedback,
    ) -> EngineResult<SearchResponse> {
        let started = Instant::now();
        let record = match self.history.get(search_id) {
            Ok(Some(record)) => record,
            Ok(None) => {
                return Err(EngineError::SearchNotFound {
                    id: search_id.to_string(),
                });
            }
            Err(e) => {
                return Err(EngineError::Degraded {
                    stage: Stage::History.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let refined = self
            .refiner
            .refine(&record.query_embedding, feedback, self.index.as_ref())?;

        self.search_ranked(RankedSearch {
            surface: Surface::Search,
            query_text: None,
            query: refined,
            filters: record.filters,
            limit: record.limit,
            user_id: record.user_id,
            exclude: HashSet::new(),
            parent_id: Some(search_id.to_string()),
            use_cache: false,
            degraded: Vec::new(),
            started,
        })
        .await
    }

    /// Past query texts containing `query`, case-insensitively.
    ///
    /// With a user, half the slots (rounded up) go to popular queries across
    /// all users and the rest to the user's own recent queries; unused slots
    /// are filled from whichever source has more. Each text appears once. A
    /// failing history yields no suggestions from that source.
    pub fn search_suggestions(
        &self,
        query: &str,
        limit: Option<usize>,
        user_id: Option<&str>,
    ) -> EngineResult<Vec<SearchSuggestion>> {
        let limit = match limit {
            Some(0) => return Err(EngineError::invalid_input("limit must be at least 1")),
            Some(requested) => requested.min(self.options.max_limit),
            None => DEFAULT_SUGGESTION_LIMIT.min(self.options.max_limit),
        };
        let needle = query.trim().to_lowercase();
        let matching = |text: &String| text.to_lowercase().contains(&needle);

        let popular: Vec<String> = match self.history.popular_queries() {
            Ok(queries) => queries.into_iter().map(|q| q.text).filter(matching).collect(),
            Err(e) => {
                warn!(error = %e, "Search history unavailable, no trending suggestions");
                Vec::new()
            }
        };
        let personal: Vec<String> = match user_id.map(|user| self.history.user_queries(user)) {
            Some(Ok(queries)) => queries.into_iter().filter(matching).collect(),
            Some(Err(e)) => {
                warn!(error = %e, "Search history unavailable, no personal suggestions");
                Vec::new()
            }
            None => Vec::new(),
        };

        let trending_share = if user_id.is_some() {
            limit.div_ceil(2)
        } else {
            limit
        };
        let mut seen = HashSet::new();
        let mut suggestions = Vec::with_capacity(limit);
        let mut offer = |text: &String, trending: bool, cap: usize| {
            if suggestions.len() < cap && seen.insert(text.to_lowercase()) {
                suggestions.push(SearchSuggestion {
                    text: text.clone(),
                    trending,
                });
            }
        };
        for text in &popular {
            offer(text, true, trending_share);
        }
        for text in &personal {
            offer(text, false, limit);
        }
        for text in &popular {
            offer(text, true, limit);
        }

        debug!(query, suggestions = suggestions.len(), "Search suggestions");
        Ok(suggestions)
    }

    fn resolve_limit(&self, limit: Option<usize>) -> EngineResult<usize> {
        match limit {
            None => Ok(self.options.default_limit.min(self.options.max_limit)),
            Some(0) => Err(EngineError::invalid_input("limit must be at least 1")),
            Some(requested) if requested > self.options.max_limit => {
                debug!(requested, max = self.options.max_limit, "Clamping result limit");
                Ok(self.options.max_limit)
            }
            Some(requested) => Ok(requested),
        }
    }

    /// Embeds every modality on its own blocking task and joins them in
    /// input order.
    async fn embed_all(&self, inputs: Vec<ModalInput>) -> Vec<Embedded> {
        let handles: Vec<_> = inputs
            .into_iter()
            .map(|input| {
                let modality = input.modality();
                let embedder = Arc::clone(&self.embedder);
                let social = Arc::clone(&self.social);
                let handle = tokio::task::spawn_blocking(move || {
                    embed_input(embedder.as_ref(), social.as_ref(), input)
                });
                (modality, handle)
            })
            .collect();

        let mut embedded = Vec::with_capacity(handles.len());
        for (modality, handle) in handles {
            match handle.await {
                Ok(item) => embedded.push(item),
                Err(e) => {
                    warn!(%modality, error = %e, "Embedding task failed, using fallback vector");
                    embedded.push(Embedded {
                        modality,
                        vector: Some(self.embedder.fallback_vector()),
                        degraded: None,
                    });
                }
            }
        }
        embedded
    }

    async fn search_ranked(&self, search: RankedSearch) -> EngineResult<SearchResponse> {
        let RankedSearch {
            surface,
            query_text,
            query,
            filters,
            limit,
            user_id,
            exclude,
            parent_id,
            use_cache,
            mut degraded,
            started,
        } = search;

        let cache = self.cache.as_ref().filter(|_| use_cache);
        let key = cache::fingerprint(surface, &query, &filters, limit, user_id.as_deref());

        if let Some(cache) = cache {
            match cache.get(&key) {
                Ok(Some(mut hit)) => {
                    debug!(key = %key, "Result cache hit");
                    hit.cached = true;
                    return Ok(hit);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Result cache unavailable, searching directly");
                    degraded.push(DegradedStage::new(Stage::Cache, &e));
                }
            }
        }

        let index = Arc::clone(&self.index);
        let ranking = Arc::clone(&self.ranking);
        let scan_query = query.clone();
        let scan_filters = filters.clone();
        let scan_user = user_id.clone();
        let ranked = self
            .workers
            .run(self.options.deadline, move || {
                let hits = index.search_candidates(&scan_query, limit, &exclude)?;
                Ok(ranking.rank(
                    hits,
                    RankingRequest {
                        filters: &scan_filters,
                        user_id: scan_user.as_deref(),
                        limit,
                    },
                ))
            })
            .await?;
        degraded.extend(ranked.degraded);

        let record = SearchRecord {
            query_text,
            query_embedding: query.clone(),
            filters,
            limit,
            user_id,
            parent_id,
            result_ids: ranked.results.iter().map(|r| r.product.id.clone()).collect(),
            created_at: Utc::now(),
        };
        let search_id = match self.history.save(record) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Search history unavailable, response cannot be refined");
                degraded.push(DegradedStage::new(Stage::History, &e));
                String::new()
            }
        };

        let response = SearchResponse {
            search_id,
            total_count: ranked.results.len(),
            products: ranked.results,
            search_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            query_embedding: query,
            degraded,
            cached: false,
        };
        info!(
            search_id = %response.search_id,
            results = response.total_count,
            time_ms = response.search_time_ms,
            "Search completed"
        );

        if let Some(cache) = cache {
            let ttl = match surface {
                Surface::Search => self.options.search_ttl,
                Surface::Similar => self.options.similar_ttl,
            };
            if let Err(e) = cache.set(&key, response.clone(), ttl) {
                warn!(error = %e, "Failed to store search response in cache");
            }
        }

        Ok(response)
    }
}

fn embed_input(embedder: &dyn Embedder, social: &dyn SocialResolver, input: ModalInput) -> Embedded {
    let modality = input.modality();
    match input {
        ModalInput::Text(text) => Embedded {
            modality,
            vector: Some(embedder.embed_text(&text)),
            degraded: None,
        },
        ModalInput::Image(bytes) => Embedded {
            modality,
            vector: Some(embedder.embed_image(&bytes)),
            degraded: None,
        },
        ModalInput::Social(url) => match social.resolve(&url) {
            Ok(content) => Embedded {
                modality,
                vector: Some(embedder.embed_social_content(&content)),
                degraded: None,
            },
            Err(e) => {
                warn!(url = %url, error = %e, "Skipping unresolvable social link");
                Embedded {
                    modality,
                    vector: None,
                    degraded: Some(DegradedStage::new(Stage::Social, &e)),
                }
            }
        },
    }
}

impl std::fmt::Debug for DiscoveryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryService")
            .field("index", &self.index)
            .field("options", &self.options)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}
