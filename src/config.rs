//! Configuration module for the discovery engine.
//!
//! Layered configuration:
//! - Default values
//! - TOML configuration file (`.seekstyle/settings.toml`)
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `SS_` and use double underscores
//! to separate nested levels:
//! - `SS_VECTOR__SEARCH_WORKERS=8` sets `vector.search_workers`
//! - `SS_RANKING__BRAND_BONUS=0.25` sets `ranking.brand_bonus`
//! - `SS_CACHE__ENABLED=false` sets `cache.enabled`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{EngineError, EngineResult};
use crate::search::{FeedbackWeights, FusionWeights, RankingWeights, ServiceOptions};
use crate::vector::{DEFAULT_CANDIDATE_MULTIPLIER, VECTOR_DIMENSION_512, VectorDimension};

const CONFIG_DIR: &str = ".seekstyle";
const CONFIG_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory holding `vectors.arena` and `mapping.json`
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    #[serde(default)]
    pub vector: VectorConfig,

    #[serde(default)]
    pub fusion: FusionConfig,

    #[serde(default)]
    pub ranking: RankingConfig,

    #[serde(default)]
    pub feedback: FeedbackConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct VectorConfig {
    /// Embedding dimension; fixed for the lifetime of an index
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Candidates scanned per requested result, before filtering
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,

    /// Scan worker threads (0 = one per CPU)
    #[serde(default)]
    pub search_workers: usize,

    /// Per-search deadline in milliseconds (0 = none)
    #[serde(default)]
    pub search_deadline_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FusionConfig {
    #[serde(default = "default_text_weight")]
    pub text_weight: f32,

    #[serde(default = "default_image_weight")]
    pub image_weight: f32,

    #[serde(default = "default_social_weight")]
    pub social_weight: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RankingConfig {
    #[serde(default = "default_brand_bonus")]
    pub brand_bonus: f32,

    #[serde(default = "default_category_bonus")]
    pub category_bonus: f32,

    /// Added once per overlapping style
    #[serde(default = "default_style_bonus")]
    pub style_bonus: f32,

    #[serde(default = "default_trending_bonus")]
    pub trending_bonus: f32,

    /// Minimum `trending_score` for the catalog trending set
    #[serde(default = "default_trending_threshold")]
    pub trending_threshold: f32,

    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FeedbackConfig {
    #[serde(default = "default_liked_weight")]
    pub liked_weight: f32,

    #[serde(default = "default_disliked_step")]
    pub disliked_step: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_search_ttl_secs")]
    pub search_ttl_secs: u64,

    #[serde(default = "default_similar_ttl_secs")]
    pub similar_ttl_secs: u64,

    /// Cached responses kept before the soonest-expiring ones are dropped
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Searches kept for refinement and suggestions
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbeddingConfig {
    /// "hashing" or "clip" (requires the `clip` feature)
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Where downloaded model files are kept
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(".seekstyle/index")
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_dimension() -> usize {
    VECTOR_DIMENSION_512
}
fn default_candidate_multiplier() -> usize {
    DEFAULT_CANDIDATE_MULTIPLIER
}
fn default_text_weight() -> f32 {
    FusionWeights::default().text
}
fn default_image_weight() -> f32 {
    FusionWeights::default().image
}
fn default_social_weight() -> f32 {
    FusionWeights::default().social
}
fn default_brand_bonus() -> f32 {
    RankingWeights::default().brand_bonus
}
fn default_category_bonus() -> f32 {
    RankingWeights::default().category_bonus
}
fn default_style_bonus() -> f32 {
    RankingWeights::default().style_bonus
}
fn default_trending_bonus() -> f32 {
    RankingWeights::default().trending_bonus
}
fn default_trending_threshold() -> f32 {
    0.7
}
fn default_max_limit() -> usize {
    100
}
fn default_limit() -> usize {
    20
}
fn default_liked_weight() -> f32 {
    FeedbackWeights::default().liked_weight
}
fn default_disliked_step() -> f32 {
    FeedbackWeights::default().disliked_step
}
fn default_search_ttl_secs() -> u64 {
    3600
}
fn default_similar_ttl_secs() -> u64 {
    7200
}
fn default_max_entries() -> usize {
    10_000
}
fn default_max_history() -> usize {
    10_000
}
fn default_embedding_model() -> String {
    "hashing".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            debug: false,
            vector: VectorConfig::default(),
            fusion: FusionConfig::default(),
            ranking: RankingConfig::default(),
            feedback: FeedbackConfig::default(),
            cache: CacheConfig::default(),
            embedding: EmbeddingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            candidate_multiplier: default_candidate_multiplier(),
            search_workers: 0,
            search_deadline_ms: 0,
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            text_weight: default_text_weight(),
            image_weight: default_image_weight(),
            social_weight: default_social_weight(),
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            brand_bonus: default_brand_bonus(),
            category_bonus: default_category_bonus(),
            style_bonus: default_style_bonus(),
            trending_bonus: default_trending_bonus(),
            trending_threshold: default_trending_threshold(),
            max_limit: default_max_limit(),
            default_limit: default_limit(),
        }
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            liked_weight: default_liked_weight(),
            disliked_step: default_disliked_step(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            search_ttl_secs: default_search_ttl_secs(),
            similar_ttl_secs: default_similar_ttl_secs(),
            max_entries: default_max_entries(),
            max_history: default_max_history(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            cache_dir: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, then apply `SS_` overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nesting levels; single underscores
            // stay part of the field name.
            .merge(Env::prefixed("SS_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find `.seekstyle/settings.toml` from the current directory upwards
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join(CONFIG_FILE))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        Self::init_config_file_in(Path::new("."), force)
    }

    /// Same as [`Settings::init_config_file`], rooted at `root`
    pub fn init_config_file_in(
        root: &Path,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# seekstyle configuration

# Version of the configuration schema
version = 1

# Directory holding vectors.arena and mapping.json
index_path = ".seekstyle/index"

# Global debug mode
debug = false

[vector]
# Embedding dimension (changing it requires a fresh index)
dimension = {dimension}
# Candidates scanned per requested result before filters apply
candidate_multiplier = {multiplier}
# Scan worker threads, 0 = one per CPU ({cpus} here)
search_workers = 0
# Per-search deadline in milliseconds, 0 = none
search_deadline_ms = 0

[fusion]
# Relative modality weights, normalized per query
text_weight = 0.4
image_weight = 0.5
social_weight = 0.3

[ranking]
brand_bonus = 0.2
category_bonus = 0.15
# Added once per overlapping style
style_bonus = 0.1
trending_bonus = 0.1
# Products with trending_score at or above this are trending
trending_threshold = 0.7
max_limit = 100
default_limit = 20

[feedback]
# Pull toward the centroid of liked products
liked_weight = 0.2
# Push away from the centroid of disliked products
disliked_step = 0.1

[cache]
enabled = true
search_ttl_secs = 3600
similar_ttl_secs = 7200
max_entries = 10000
max_history = 10000

[embedding]
# "hashing" (no model files) or "clip" (needs the clip feature)
model = "hashing"

[logging]
# Used when RUST_LOG is unset
level = "info"
"#,
            dimension = VECTOR_DIMENSION_512,
            multiplier = DEFAULT_CANDIDATE_MULTIPLIER,
            cpus = num_cpus::get(),
        );

        std::fs::write(&config_path, template)?;
        Ok(config_path)
    }

    /// The configured dimension, validated.
    pub fn vector_dimension(&self) -> EngineResult<VectorDimension> {
        VectorDimension::new(self.vector.dimension).map_err(|e| EngineError::Config {
            reason: format!("vector.dimension: {e}"),
        })
    }

    /// Search tunables derived from these settings.
    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            fusion: FusionWeights {
                text: self.fusion.text_weight,
                image: self.fusion.image_weight,
                social: self.fusion.social_weight,
            },
            ranking: RankingWeights {
                brand_bonus: self.ranking.brand_bonus,
                category_bonus: self.ranking.category_bonus,
                style_bonus: self.ranking.style_bonus,
                trending_bonus: self.ranking.trending_bonus,
            },
            feedback: FeedbackWeights {
                liked_weight: self.feedback.liked_weight,
                disliked_step: self.feedback.disliked_step,
            },
            trending_threshold: self.ranking.trending_threshold,
            default_limit: self.ranking.default_limit,
            max_limit: self.ranking.max_limit,
            cache_enabled: self.cache.enabled,
            search_ttl: Duration::from_secs(self.cache.search_ttl_secs),
            similar_ttl: Duration::from_secs(self.cache.similar_ttl_secs),
            cache_capacity: self.cache.max_entries,
            history_capacity: self.cache.max_history,
            search_workers: self.vector.search_workers,
            deadline: (self.vector.search_deadline_ms > 0)
                .then(|| Duration::from_millis(self.vector.search_deadline_ms)),
        }
    }
}
