//! Deterministic feature-hashing embedder.
//!
//! Text is split into lowercase word tokens and character trigrams; each
//! feature is hashed with SHA-256 onto a signed bucket. Texts sharing words
//! land close together, which is enough for offline catalogs and tests.
//! Images are embedded from a folded byte histogram plus a content digest.

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::catalog::ProductRecord;
use crate::embedding::{Embedder, SocialContent};
use crate::vector::VectorDimension;
use crate::vector::math::{linear_combination, mean, normalize_in_place};

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.35;

/// Share of the text embedding when a product also has an image reference.
const PRODUCT_TEXT_SHARE: f32 = 0.7;

/// Image references considered per social post.
const MAX_SOCIAL_IMAGES: usize = 3;

/// Embedder that needs no model files.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimension: VectorDimension,
}

impl HashingEmbedder {
    pub fn new(dimension: VectorDimension) -> Self {
        Self { dimension }
    }

    fn accumulate(&self, acc: &mut [f32], feature: &[u8], weight: f32) {
        let digest = Sha256::digest(feature);
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % acc.len() as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        acc[bucket] += sign * weight;
    }

    fn finish(&self, mut acc: Vec<f32>, input: &str) -> Vec<f32> {
        match normalize_in_place(&mut acc) {
            Ok(()) => acc,
            Err(e) => {
                debug!(input, error = %e, "Nothing to embed, using fallback vector");
                self.fallback_vector()
            }
        }
    }

    /// Embeds an image reference (URL) that is not downloaded.
    fn embed_reference(&self, reference: &str) -> Vec<f32> {
        let mut acc = vec![0.0f32; self.dimension.get()];
        for (i, chunk) in reference.as_bytes().chunks(4).enumerate() {
            let mut feature = Vec::with_capacity(chunk.len() + 8);
            feature.extend_from_slice(&(i as u64).to_le_bytes());
            feature.extend_from_slice(chunk);
            self.accumulate(&mut acc, &feature, 1.0);
        }
        self.finish(acc, reference)
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(VectorDimension::default())
    }
}

impl Embedder for HashingEmbedder {
    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut acc = vec![0.0f32; self.dimension.get()];
        let lowered = text.to_lowercase();

        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            self.accumulate(&mut acc, token.as_bytes(), WORD_WEIGHT);

            let chars: Vec<char> = token.chars().collect();
            if chars.len() > 3 {
                for window in chars.windows(3) {
                    let trigram: String = window.iter().collect();
                    let feature = format!("#{trigram}");
                    self.accumulate(&mut acc, feature.as_bytes(), TRIGRAM_WEIGHT);
                }
            }
        }

        self.finish(acc, text)
    }

    fn embed_image(&self, image: &[u8]) -> Vec<f32> {
        let dim = self.dimension.get();
        let mut acc = vec![0.0f32; dim];
        if image.is_empty() {
            return self.finish(acc, "<empty image>");
        }

        let mut histogram = [0u32; 256];
        for byte in image {
            histogram[*byte as usize] += 1;
        }
        let total = image.len() as f32;
        for (value, count) in histogram.iter().enumerate() {
            acc[value % dim] += *count as f32 / total;
        }

        // Content digest expanded over the vector; identical bytes, identical vector.
        let digest = Sha256::digest(image);
        for (i, slot) in acc.iter_mut().enumerate() {
            let byte = digest[i % digest.len()].rotate_left((i / digest.len()) as u32);
            *slot += (byte as f32 / 255.0 - 0.5) * 0.05;
        }

        self.finish(acc, "<image>")
    }

    fn embed_product(&self, product: &ProductRecord) -> Vec<f32> {
        let text = self.embed_text(&product.embedding_text());
        let Some(url) = product.image_url.as_deref().filter(|u| !u.is_empty()) else {
            return text;
        };

        let image = self.embed_reference(url);
        let blended = linear_combination(PRODUCT_TEXT_SHARE, &text, 1.0 - PRODUCT_TEXT_SHARE, &image);
        self.finish(blended, &product.id)
    }

    fn embed_social_content(&self, content: &SocialContent) -> Vec<f32> {
        let mut parts = vec![self.embed_text(&content.text())];
        parts.extend(
            content
                .image_urls
                .iter()
                .take(MAX_SOCIAL_IMAGES)
                .map(|url| self.embed_reference(url)),
        );

        match mean(&parts) {
            Some(combined) => self.finish(combined, &content.title),
            None => self.fallback_vector(),
        }
    }
}
