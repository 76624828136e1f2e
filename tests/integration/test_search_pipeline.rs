//! End-to-end search through `DiscoveryService` with hand-placed vectors.

use std::sync::Arc;

use seekstyle::embedding::{Embedder, SocialContent};
use seekstyle::search::{
    Feedback, ServiceOptions, StaticPreferences, StaticSocialResolver, StaticTrending,
    UserPreferences,
};
use seekstyle::vector::math::{dot, is_unit};
use seekstyle::{
    CombinedQuery, DiscoveryService, ProductRecord, SearchFilters, VectorDimension, VectorIndex,
};
use tempfile::TempDir;

/// Embeds text by keyword: each known word points along its own axis.
struct KeywordEmbedder;

impl KeywordEmbedder {
    fn axis(i: usize) -> Vec<f32> {
        let mut v = vec![0.0; 3];
        v[i] = 1.0;
        v
    }
}

impl Embedder for KeywordEmbedder {
    fn dimension(&self) -> VectorDimension {
        VectorDimension::new(3).unwrap()
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        if text.contains("coat") {
            Self::axis(1)
        } else if text.contains("shoe") {
            Self::axis(2)
        } else {
            Self::axis(0)
        }
    }

    fn embed_image(&self, _image: &[u8]) -> Vec<f32> {
        Self::axis(1)
    }

    fn embed_social_content(&self, content: &SocialContent) -> Vec<f32> {
        self.embed_text(&content.title)
    }
}

fn unit(x: f32) -> Vec<f32> {
    vec![x, (1.0 - x * x).sqrt(), 0.0]
}

/// B is inserted before A so a score tie between them goes to B.
fn scenario_index(dir: &TempDir) -> Arc<VectorIndex> {
    let index = VectorIndex::open(dir.path(), VectorDimension::new(3).unwrap()).unwrap();
    index
        .add("B", &unit(0.7), ProductRecord::new("B").with_brand("Mango"))
        .unwrap();
    index
        .add("A", &unit(0.9), ProductRecord::new("A").with_brand("Zara"))
        .unwrap();
    index
        .add("C", &unit(0.5), ProductRecord::new("C").with_brand("COS"))
        .unwrap();
    Arc::new(index)
}

fn result_ids(response: &seekstyle::SearchResponse) -> Vec<&str> {
    response
        .products
        .iter()
        .map(|r| r.product.id.as_str())
        .collect()
}

#[tokio::test]
async fn test_top_two_without_filters() {
    let dir = TempDir::new().unwrap();
    let service = DiscoveryService::builder(scenario_index(&dir), Arc::new(KeywordEmbedder))
        .build()
        .unwrap();

    let response = service
        .text_search("dress", SearchFilters::default(), Some(2), None)
        .await
        .unwrap();

    assert_eq!(result_ids(&response), vec!["A", "B"]);
    assert!((response.products[0].similarity_score - 0.9).abs() < 1e-5);
    assert!(response.products.iter().all(|r| r.adjusted_score.is_none()));
}

#[tokio::test]
async fn test_brand_bonus_tie_resolves_by_insertion_order() {
    let dir = TempDir::new().unwrap();
    let preferences = StaticPreferences::new().with_user(
        "u1",
        UserPreferences {
            preferred_brands: vec!["mango".to_string()],
            ..Default::default()
        },
    );
    let service = DiscoveryService::builder(scenario_index(&dir), Arc::new(KeywordEmbedder))
        .preferences(Arc::new(preferences))
        .build()
        .unwrap();

    let response = service
        .text_search("dress", SearchFilters::default(), Some(2), Some("u1"))
        .await
        .unwrap();

    assert_eq!(result_ids(&response), vec!["B", "A"]);
    let b = &response.products[0];
    assert!((b.adjusted_score.unwrap() - 0.9).abs() < 1e-5);
}

#[tokio::test]
async fn test_trending_bonus_and_ordering() {
    let dir = TempDir::new().unwrap();
    let service = DiscoveryService::builder(scenario_index(&dir), Arc::new(KeywordEmbedder))
        .trending(Arc::new(StaticTrending::new(["C"])))
        .options(ServiceOptions {
            cache_enabled: false,
            ..Default::default()
        })
        .build()
        .unwrap();

    let response = service
        .text_search("dress", SearchFilters::default(), None, None)
        .await
        .unwrap();

    assert_eq!(result_ids(&response), vec!["A", "B", "C"]);
    let scores: Vec<f32> = response.products.iter().map(|r| r.final_score()).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    assert!(response.products[2].adjusted_score.is_some());
}

#[tokio::test]
async fn test_repeated_searches_are_identical() {
    let dir = TempDir::new().unwrap();
    let service = DiscoveryService::builder(scenario_index(&dir), Arc::new(KeywordEmbedder))
        .options(ServiceOptions {
            cache_enabled: false,
            ..Default::default()
        })
        .build()
        .unwrap();

    let first = service
        .text_search("dress", SearchFilters::default(), None, None)
        .await
        .unwrap();
    let second = service
        .text_search("dress", SearchFilters::default(), None, None)
        .await
        .unwrap();

    assert_eq!(first.products, second.products);
    assert!(!second.cached);
    assert_ne!(first.search_id, second.search_id);
}

#[tokio::test]
async fn test_combined_query_fuses_modalities() {
    let dir = TempDir::new().unwrap();
    let social = StaticSocialResolver::new().with_entry(
        "https://pin.it/shoes",
        SocialContent {
            title: "shoe".to_string(),
            ..Default::default()
        },
    );
    let service = DiscoveryService::builder(scenario_index(&dir), Arc::new(KeywordEmbedder))
        .social(Arc::new(social))
        .build()
        .unwrap();

    let response = service
        .combined_search(
            CombinedQuery::new()
                .with_text("dress")
                .with_image(vec![1, 2, 3])
                .with_social_url("https://pin.it/shoes")
                .with_limit(3),
        )
        .await
        .unwrap();

    let query = &response.query_embedding;
    assert!(is_unit(query));
    // Text, image and social weights 0.4 : 0.5 : 0.3 along the three axes.
    assert!(query[1] > query[0] && query[0] > query[2] && query[2] > 0.0);
    assert!(response.degraded.is_empty());
}

#[tokio::test]
async fn test_refinement_moves_toward_liked_product() {
    let dir = TempDir::new().unwrap();
    let index = scenario_index(&dir);
    let service = DiscoveryService::builder(Arc::clone(&index), Arc::new(KeywordEmbedder))
        .build()
        .unwrap();

    let original = service
        .text_search("dress", SearchFilters::default(), Some(3), None)
        .await
        .unwrap();
    let refined = service
        .refine_search(
            &original.search_id,
            &Feedback {
                liked_products: vec!["C".to_string()],
                disliked_products: vec!["missing".to_string()],
            },
        )
        .await
        .unwrap();

    let c = index.reconstruct("C").unwrap();
    assert!(dot(&refined.query_embedding, &c) >= dot(&original.query_embedding, &c));
    assert!(is_unit(&refined.query_embedding));
    assert_eq!(refined.total_count, 3);
}
