//! Embedding generation for search inputs and catalog products.
//!
//! Every [`Embedder`] maps its input into the same fixed-dimension space and
//! returns a unit vector. Embedders never fail: when an input cannot be
//! embedded they log the cause and return [`Embedder::fallback_vector`], since
//! query fusion cannot work around a missing modality.
//!
//! Implementations:
//! - [`HashingEmbedder`]: deterministic feature hashing, no model download
//! - `ClipEmbedder`: CLIP ViT-B/32 text and image encoders via fastembed
//!   (cargo feature `clip`)
//! - [`CachedEmbedder`]: explicit cache in front of any embedder

mod cache;
#[cfg(feature = "clip")]
mod clip;
mod hashing;

pub use cache::{CacheStats, CachedEmbedder};
#[cfg(feature = "clip")]
pub use clip::ClipEmbedder;
pub use hashing::HashingEmbedder;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::ProductRecord;
use crate::vector::VectorDimension;
use crate::vector::math::uniform_unit_vector;

/// Errors raised while constructing an embedder.
///
/// Embedding calls themselves are infallible; see [`Embedder`].
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error(
        "Failed to initialize embedding model: {0}\nSuggestion: Ensure you have internet connection for first-time model download"
    )]
    ModelInit(String),

    #[error("Unknown embedding model '{0}'. Available models: hashing, clip")]
    UnknownModel(String),

    #[error("Embedding model '{0}' requires building with the '{0}' cargo feature")]
    FeatureDisabled(String),
}

/// Structured content resolved from a social-media link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialContent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
}

impl SocialContent {
    /// Title, description and tags joined by spaces.
    pub fn text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if !self.title.trim().is_empty() {
            parts.push(&self.title);
        }
        if !self.description.trim().is_empty() {
            parts.push(&self.description);
        }
        parts.extend(self.tags.iter().map(String::as_str));
        parts.join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.text().trim().is_empty() && self.image_urls.is_empty()
    }
}

/// Converts raw inputs into unit vectors of a fixed dimension.
///
/// Implementations must be thread-safe; the search service calls them from
/// blocking worker threads, one modality per thread.
pub trait Embedder: Send + Sync {
    /// Dimension of every vector this embedder returns.
    fn dimension(&self) -> VectorDimension;

    /// Embeds free text.
    fn embed_text(&self, text: &str) -> Vec<f32>;

    /// Embeds encoded image bytes.
    fn embed_image(&self, image: &[u8]) -> Vec<f32>;

    /// Embeds a catalog product from its textual attributes.
    fn embed_product(&self, product: &ProductRecord) -> Vec<f32> {
        self.embed_text(&product.embedding_text())
    }

    /// Embeds content resolved from a social link.
    fn embed_social_content(&self, content: &SocialContent) -> Vec<f32> {
        self.embed_text(&content.text())
    }

    /// Vector returned when an input cannot be embedded.
    fn fallback_vector(&self) -> Vec<f32> {
        uniform_unit_vector(self.dimension().get())
    }
}

/// Returns a short label for the configured model name, validating it.
pub fn parse_model_name(name: &str) -> Result<&'static str, EmbeddingError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "hashing" => Ok("hashing"),
        "clip" | "clip-vit-b-32" => {
            if cfg!(feature = "clip") {
                Ok("clip")
            } else {
                Err(EmbeddingError::FeatureDisabled("clip".to_string()))
            }
        }
        other => Err(EmbeddingError::UnknownModel(other.to_string())),
    }
}
