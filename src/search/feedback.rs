//! Like/dislike refinement of a previously issued query vector.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::EngineResult;
use crate::vector::math::{linear_combination, mean, normalize_in_place};
use crate::vector::{VectorDimension, VectorIndex};

/// Products a user reacted to in a result list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    #[serde(default)]
    pub liked_products: Vec<String>,
    #[serde(default)]
    pub disliked_products: Vec<String>,
}

impl Feedback {
    pub fn is_empty(&self) -> bool {
        self.liked_products.is_empty() && self.disliked_products.is_empty()
    }
}

/// Lookup of stored product vectors by id.
pub trait VectorSource {
    fn dimension(&self) -> VectorDimension;

    /// Stored unit vector, or `None` when the id does not resolve.
    fn vector(&self, id: &str) -> Option<Vec<f32>>;
}

impl VectorSource for VectorIndex {
    fn dimension(&self) -> VectorDimension {
        VectorIndex::dimension(self)
    }

    fn vector(&self, id: &str) -> Option<Vec<f32>> {
        self.reconstruct(id).ok()
    }
}

/// Step sizes of the refinement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedbackWeights {
    /// Share of the liked centroid blended into the query.
    pub liked_weight: f32,
    /// Step taken away from the disliked centroid.
    pub disliked_step: f32,
}

impl Default for FeedbackWeights {
    fn default() -> Self {
        Self {
            liked_weight: 0.2,
            disliked_step: 0.1,
        }
    }
}

/// Moves a query toward liked products and away from disliked ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedbackRefiner {
    weights: FeedbackWeights,
}

impl FeedbackRefiner {
    pub fn new(weights: FeedbackWeights) -> Self {
        Self { weights }
    }

    /// Returns the refined unit query.
    ///
    /// The liked blend runs first and the disliked step is taken from its
    /// result. Ids that do not resolve are skipped. If refinement cancels the
    /// query out entirely, the original query is returned.
    pub fn refine(
        &self,
        query: &[f32],
        feedback: &Feedback,
        source: &impl VectorSource,
    ) -> EngineResult<Vec<f32>> {
        source.dimension().validate_vector(query)?;
        let mut refined = query.to_vec();

        let liked = resolve(&feedback.liked_products, source);
        if let Some(centroid) = mean(&liked) {
            let w = self.weights.liked_weight;
            refined = linear_combination(1.0 - w, &refined, w, &centroid);
        }

        let disliked = resolve(&feedback.disliked_products, source);
        if let Some(centroid) = mean(&disliked) {
            let step = self.weights.disliked_step;
            // q + step·(q − c) = (1 + step)·q − step·c
            refined = linear_combination(1.0 + step, &refined, -step, &centroid);
        }

        debug!(
            liked = liked.len(),
            disliked = disliked.len(),
            "Applied feedback to query"
        );

        match normalize_in_place(&mut refined) {
            Ok(()) => Ok(refined),
            Err(e) => {
                warn!(error = %e, "Refined query degenerated, keeping original query");
                Ok(query.to_vec())
            }
        }
    }
}

fn resolve(ids: &[String], source: &impl VectorSource) -> Vec<Vec<f32>> {
    let dimension = source.dimension();
    ids.iter()
        .filter_map(|id| {
            let vector = source.vector(id);
            if vector.is_none() {
                debug!(id, "Feedback product not found, skipping");
            }
            vector
        })
        .filter(|v| dimension.validate_vector(v).is_ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::vector::math::{dot, is_unit, normalized};
    use std::collections::HashMap;

    struct Fixed(HashMap<&'static str, Vec<f32>>);

    impl VectorSource for Fixed {
        fn dimension(&self) -> VectorDimension {
            VectorDimension::new(3).unwrap()
        }

        fn vector(&self, id: &str) -> Option<Vec<f32>> {
            self.0.get(id).cloned()
        }
    }

    fn source() -> Fixed {
        Fixed(HashMap::from([
            ("p", normalized(&[0.2, 1.0, 0.0]).unwrap()),
            ("q", normalized(&[0.0, 0.0, 1.0]).unwrap()),
            ("anti", vec![-1.0, 0.0, 0.0]),
        ]))
    }

    fn feedback(liked: &[&str], disliked: &[&str]) -> Feedback {
        Feedback {
            liked_products: liked.iter().map(|s| s.to_string()).collect(),
            disliked_products: disliked.iter().map(|s| s.to_string()).collect(),
        }
    }

    const QUERY: [f32; 3] = [1.0, 0.0, 0.0];

    #[test]
    fn test_like_moves_query_toward_product() {
        let src = source();
        let p = src.vector("p").unwrap();
        let refined = FeedbackRefiner::default()
            .refine(&QUERY, &feedback(&["p"], &[]), &src)
            .unwrap();

        assert!(is_unit(&refined));
        assert!(dot(&refined, &p) >= dot(&QUERY, &p));
    }

    #[test]
    fn test_dislike_moves_query_away() {
        let src = source();
        let q = src.vector("q").unwrap();
        let start = normalized(&[1.0, 0.0, 0.5]).unwrap();
        let refined = FeedbackRefiner::default()
            .refine(&start, &feedback(&[], &["q"]), &src)
            .unwrap();

        assert!(is_unit(&refined));
        assert!(dot(&refined, &q) < dot(&start, &q));
    }

    #[test]
    fn test_dislike_step_uses_liked_blend() {
        let src = source();
        let refined = FeedbackRefiner::default()
            .refine(&QUERY, &feedback(&["p"], &["q"]), &src)
            .unwrap();

        let p = src.vector("p").unwrap();
        let q = src.vector("q").unwrap();
        let blended = linear_combination(0.8, &QUERY, 0.2, &p);
        let expected = normalized(&linear_combination(1.1, &blended, -0.1, &q)).unwrap();
        for (a, b) in refined.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_unknown_ids_are_skipped() {
        let src = source();
        let refined = FeedbackRefiner::default()
            .refine(&QUERY, &feedback(&["missing"], &["gone"]), &src)
            .unwrap();
        assert_eq!(refined, QUERY.to_vec());
    }

    #[test]
    fn test_degenerate_refinement_returns_original() {
        let src = source();
        let weights = FeedbackWeights {
            liked_weight: 0.5,
            disliked_step: 0.1,
        };
        // 0.5·q + 0.5·(−q) = 0
        let refined = FeedbackRefiner::new(weights)
            .refine(&QUERY, &feedback(&["anti"], &[]), &src)
            .unwrap();
        assert_eq!(refined, QUERY.to_vec());
    }

    #[test]
    fn test_query_dimension_checked() {
        let err = FeedbackRefiner::default()
            .refine(&[1.0, 0.0], &Feedback::default(), &source())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidVector(_)));
    }
}
