//! Explicit embedding cache.
//!
//! Wraps an embedder and memoizes text and image embeddings keyed by the
//! SHA-256 digest of the input. The cache is owned by whoever builds it and
//! is cleared on demand; there is no process-wide state.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::catalog::ProductRecord;
use crate::embedding::{Embedder, SocialContent};
use crate::vector::VectorDimension;

type Key = [u8; 32];

/// Entry counts per modality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub text_entries: usize,
    pub image_entries: usize,
}

/// Memoizing wrapper around another [`Embedder`].
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    text: DashMap<Key, Arc<Vec<f32>>>,
    image: DashMap<Key, Arc<Vec<f32>>>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>) -> Self {
        Self {
            inner,
            text: DashMap::new(),
            image: DashMap::new(),
        }
    }

    /// Drops every cached embedding.
    pub fn clear(&self) {
        let stats = self.stats();
        self.text.clear();
        self.image.clear();
        info!(
            text_entries = stats.text_entries,
            image_entries = stats.image_entries,
            "Embedding caches cleared"
        );
    }

    pub fn len(&self) -> usize {
        self.text.len() + self.image.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            text_entries: self.text.len(),
            image_entries: self.image.len(),
        }
    }

    fn memoize(
        map: &DashMap<Key, Arc<Vec<f32>>>,
        input: &[u8],
        compute: impl FnOnce() -> Vec<f32>,
    ) -> Vec<f32> {
        let mut key: Key = [0u8; 32];
        key.copy_from_slice(&Sha256::digest(input));
        if let Some(hit) = map.get(&key) {
            return Vec::clone(hit.value());
        }

        let vector = compute();
        map.insert(key, Arc::new(vector.clone()));
        vector
    }
}

impl std::fmt::Debug for CachedEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedEmbedder")
            .field("dimension", &self.inner.dimension())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Embedder for CachedEmbedder {
    fn dimension(&self) -> VectorDimension {
        self.inner.dimension()
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        Self::memoize(&self.text, text.as_bytes(), || self.inner.embed_text(text))
    }

    fn embed_image(&self, image: &[u8]) -> Vec<f32> {
        Self::memoize(&self.image, image, || self.inner.embed_image(image))
    }

    fn embed_product(&self, product: &ProductRecord) -> Vec<f32> {
        self.inner.embed_product(product)
    }

    fn embed_social_content(&self, content: &SocialContent) -> Vec<f32> {
        self.inner.embed_social_content(content)
    }

    fn fallback_vector(&self) -> Vec<f32> {
        self.inner.fallback_vector()
    }
}
