/// Content-based product discovery: exact vector search over catalog
/// embeddings, multi-modal query fusion, personalized ranking and feedback
/// refinement.
pub mod catalog;
pub mod config;
pub mod display;
pub mod embedding;
pub mod error;
pub mod logging;
pub mod search;
pub mod vector;

// Explicit exports for better API clarity
pub use catalog::{Availability, ProductPatch, ProductRecord, SearchFilters};
pub use config::Settings;
pub use embedding::{CachedEmbedder, Embedder, HashingEmbedder, SocialContent};
pub use error::{EngineError, EngineResult, ErrorCategory, ProviderError, ProviderResult};
pub use search::{
    CombinedQuery, DiscoveryService, Feedback, SearchResponse, SearchResult, SearchSuggestion,
    ServiceOptions,
};
pub use vector::{IndexStats, SearchHit, Slot, VectorDimension, VectorIndex};
