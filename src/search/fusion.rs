//! Weighted fusion of several modality embeddings into one query vector.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::vector::VectorError;
use crate::vector::math::{mean, normalize_in_place, normalized};

/// Search input modalities with a configured default weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Text,
    Image,
    Social,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Social => "social",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relative weight per modality. Normalized to sum 1 at fusion time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub text: f32,
    pub image: f32,
    pub social: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            text: 0.4,
            image: 0.5,
            social: 0.3,
        }
    }
}

impl FusionWeights {
    pub fn weight(&self, modality: Modality) -> f32 {
        match modality {
            Modality::Text => self.text,
            Modality::Image => self.image,
            Modality::Social => self.social,
        }
    }
}

/// One labelled, weighted embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionInput {
    pub label: String,
    pub vector: Vec<f32>,
    pub weight: f32,
}

impl FusionInput {
    pub fn new(label: impl Into<String>, vector: Vec<f32>, weight: f32) -> Self {
        Self {
            label: label.into(),
            vector,
            weight,
        }
    }
}

/// Fuses modality embeddings using configured weights.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryFusion {
    weights: FusionWeights,
}

impl QueryFusion {
    pub fn new(weights: FusionWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> FusionWeights {
        self.weights
    }

    /// Builds an input labelled and weighted by `modality`.
    pub fn input(&self, modality: Modality, vector: Vec<f32>) -> FusionInput {
        FusionInput::new(modality.as_str(), vector, self.weights.weight(modality))
    }

    pub fn fuse(&self, inputs: Vec<FusionInput>) -> EngineResult<Vec<f32>> {
        fuse(inputs)
    }
}

/// Merges inputs into a single unit vector.
///
/// Vectors sharing a label are averaged unweighted first; that label keeps
/// the weight of its first input. Label weights are normalized to sum 1 and
/// the weighted average is renormalized to unit length.
pub fn fuse(inputs: Vec<FusionInput>) -> EngineResult<Vec<f32>> {
    let Some(first) = inputs.first() else {
        return Err(EngineError::NoInput);
    };
    let dimension = first.vector.len();

    // Labels in first-appearance order.
    let mut groups: Vec<(String, f32, Vec<Vec<f32>>)> = Vec::new();
    for input in inputs {
        if input.vector.len() != dimension {
            return Err(VectorError::DimensionMismatch {
                expected: dimension,
                actual: input.vector.len(),
            }
            .into());
        }
        let unit = normalized(&input.vector)?;

        match groups.iter_mut().find(|(label, _, _)| *label == input.label) {
            Some((_, _, vectors)) => vectors.push(unit),
            None => {
                if !input.weight.is_finite() || input.weight < 0.0 {
                    return Err(EngineError::invalid_input(format!(
                        "weight for '{}' must be a non-negative number, got {}",
                        input.label, input.weight
                    )));
                }
                groups.push((input.label, input.weight, vec![unit]));
            }
        }
    }

    let total: f32 = groups.iter().map(|(_, weight, _)| weight).sum();
    if total <= 0.0 {
        return Err(EngineError::invalid_input(
            "fusion weights must sum to a positive value",
        ));
    }

    let mut fused = vec![0.0f32; dimension];
    for (_, weight, vectors) in &groups {
        let Some(representative) = mean(vectors) else {
            continue;
        };
        let share = weight / total;
        for (acc, x) in fused.iter_mut().zip(&representative) {
            *acc += share * x;
        }
    }

    normalize_in_place(&mut fused)?;
    Ok(fused)
}
