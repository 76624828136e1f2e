//! CLIP ViT-B/32 embedder backed by fastembed.
//!
//! Text and images are encoded by the two halves of the same CLIP model, so
//! both land in one 512-dimensional space and can be fused directly.

use std::path::PathBuf;
use std::sync::Mutex;

use fastembed::{
    EmbeddingModel, ImageEmbedding, ImageEmbeddingModel, ImageInitOptions, InitOptions,
    TextEmbedding,
};
use tracing::{debug, warn};

use crate::embedding::{Embedder, EmbeddingError};
use crate::vector::VectorDimension;
use crate::vector::math::normalize_in_place;

/// fastembed CLIP text and image encoders.
pub struct ClipEmbedder {
    text_model: Mutex<TextEmbedding>,
    image_model: Mutex<ImageEmbedding>,
    dimension: VectorDimension,
}

impl ClipEmbedder {
    /// Loads both encoders, downloading them into `cache_dir` on first use.
    ///
    /// # Errors
    /// Returns an error if either model fails to initialize or download.
    pub fn new(cache_dir: PathBuf, show_download_progress: bool) -> Result<Self, EmbeddingError> {
        let text_model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::ClipVitB32)
                .with_cache_dir(cache_dir.clone())
                .with_show_download_progress(show_download_progress),
        )
        .map_err(|e| EmbeddingError::ModelInit(format!("CLIP text encoder: {e}")))?;

        let image_model = ImageEmbedding::try_new(
            ImageInitOptions::new(ImageEmbeddingModel::ClipVitB32)
                .with_cache_dir(cache_dir)
                .with_show_download_progress(show_download_progress),
        )
        .map_err(|e| EmbeddingError::ModelInit(format!("CLIP image encoder: {e}")))?;

        debug!("Loaded CLIP ViT-B/32 text and image encoders");

        Ok(Self {
            text_model: Mutex::new(text_model),
            image_model: Mutex::new(image_model),
            dimension: VectorDimension::dimension_512(),
        })
    }

    fn accept(&self, embedding: Option<Vec<f32>>, modality: &str) -> Vec<f32> {
        let Some(mut vector) = embedding else {
            return self.fallback_vector();
        };

        if let Err(e) = self.dimension.validate_vector(&vector) {
            warn!(modality, error = %e, "CLIP returned an unexpected shape, using fallback vector");
            return self.fallback_vector();
        }
        match normalize_in_place(&mut vector) {
            Ok(()) => vector,
            Err(e) => {
                warn!(modality, error = %e, "CLIP returned an unusable vector, using fallback vector");
                self.fallback_vector()
            }
        }
    }
}

impl Embedder for ClipEmbedder {
    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let embedding = match self.text_model.lock() {
            Ok(mut model) => match model.embed(vec![text.to_string()], None) {
                Ok(mut batch) => batch.pop(),
                Err(e) => {
                    warn!(error = %e, "Text embedding failed, using fallback vector");
                    None
                }
            },
            Err(_) => {
                warn!("Failed to acquire text model lock - model may be poisoned");
                None
            }
        };
        self.accept(embedding, "text")
    }

    fn embed_image(&self, image: &[u8]) -> Vec<f32> {
        let embedding = match self.image_model.lock() {
            Ok(mut model) => match model.embed_bytes(&[image], None) {
                Ok(mut batch) => batch.pop(),
                Err(e) => {
                    warn!(error = %e, "Image embedding failed, using fallback vector");
                    None
                }
            },
            Err(_) => {
                warn!("Failed to acquire image model lock - model may be poisoned");
                None
            }
        };
        self.accept(embedding, "image")
    }
}
