//! Query construction, ranking and the search surface built on the index.

pub mod cache;
mod feedback;
mod fusion;
mod history;
mod ranking;
mod service;
mod signals;
mod social;
mod workers;

pub use cache::{ResultCache, Surface, TtlCache};
pub use feedback::{Feedback, FeedbackRefiner, FeedbackWeights, VectorSource};
pub use fusion::{FusionInput, FusionWeights, Modality, QueryFusion, fuse};
pub use history::{InMemorySearchHistory, QueryCount, SearchHistory, SearchRecord};
pub use ranking::{
    DegradedStage, Ranked, RankingPipeline, RankingRequest, RankingWeights, SearchResult, Stage,
};
pub use service::{
    CombinedQuery, DiscoveryService, DiscoveryServiceBuilder, SearchResponse, SearchSuggestion,
    ServiceOptions,
};
pub use signals::{
    CatalogTrending, NoPreferences, PreferenceProvider, StaticPreferences, StaticTrending,
    TrendingProvider, UserPreferences,
};
pub use social::{SlugSocialResolver, SocialResolver, StaticSocialResolver};
pub use workers::SearchWorkers;
