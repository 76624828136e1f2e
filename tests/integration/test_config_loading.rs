//! Settings file to a working service.

use std::sync::Arc;
use std::time::Duration;

use seekstyle::{
    DiscoveryService, ErrorCategory, HashingEmbedder, ProductRecord, SearchFilters, Settings,
    VectorDimension, VectorIndex,
};
use tempfile::TempDir;

#[tokio::test]
async fn test_settings_drive_service_construction() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("settings.toml");
    let index_path = temp_dir.path().join("index");
    std::fs::write(
        &config_path,
        format!(
            r#"
index_path = "{}"

[vector]
dimension = 32
search_workers = 2

[ranking]
default_limit = 1

[cache]
search_ttl_secs = 60
"#,
            index_path.display().to_string().replace('\\', "/")
        ),
    )
    .unwrap();

    let settings = Settings::load_from(&config_path).unwrap();
    let options = settings.service_options();
    assert_eq!(options.search_ttl, Duration::from_secs(60));
    assert_eq!(options.search_workers, 2);

    let dimension = settings.vector_dimension().unwrap();
    let index = Arc::new(VectorIndex::open(&settings.index_path, dimension).unwrap());
    let service = DiscoveryService::builder(index, Arc::new(HashingEmbedder::new(dimension)))
        .options(options)
        .build()
        .unwrap();

    service
        .ingest(vec![
            ProductRecord::new("p1").with_title("linen shirt"),
            ProductRecord::new("p2").with_title("wool coat"),
        ])
        .await
        .unwrap();

    let response = service
        .text_search("linen shirt", SearchFilters::default(), None, None)
        .await
        .unwrap();
    assert_eq!(response.total_count, 1);
    assert_eq!(response.products[0].product.id, "p1");
    assert!(index_path.join("mapping.json").exists());
}

#[test]
fn test_embedder_dimension_must_match_index() {
    let temp_dir = TempDir::new().unwrap();
    let index = Arc::new(
        VectorIndex::open(temp_dir.path(), VectorDimension::new(16).unwrap()).unwrap(),
    );
    let err = DiscoveryService::builder(
        index,
        Arc::new(HashingEmbedder::new(VectorDimension::new(32).unwrap())),
    )
    .build()
    .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Fatal);
}
