//! Index lifecycle across process restarts: add, remove, update, compact, reopen.

use std::collections::HashSet;

use seekstyle::vector::{ARENA_FILE_NAME, MAPPING_FILE_NAME};
use seekstyle::{EngineError, ErrorCategory, ProductPatch, ProductRecord, VectorDimension, VectorIndex};
use tempfile::TempDir;

fn dim() -> VectorDimension {
    VectorDimension::new(4).unwrap()
}

fn basis(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; 4];
    v[i] = 1.0;
    v
}

fn ids(index: &VectorIndex, query: &[f32], limit: usize) -> Vec<String> {
    index
        .search(query, limit, &HashSet::new())
        .unwrap()
        .into_iter()
        .map(|hit| hit.id)
        .collect()
}

#[test]
fn test_full_lifecycle_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let query = vec![0.8, 0.6, 0.0, 0.0];

    {
        let index = VectorIndex::open(temp_dir.path(), dim()).unwrap();
        index
            .add_batch(vec![
                (ProductRecord::new("a").with_brand("Zara"), basis(0)),
                (ProductRecord::new("b").with_brand("Mango"), basis(1)),
                (ProductRecord::new("c"), basis(2)),
            ])
            .unwrap();
        assert!(index.remove("c").unwrap());
        index
            .update(
                "b",
                ProductPatch {
                    price: Some(42.0),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(ids(&index, &query, 3), vec!["a", "b"]);
    }

    assert!(temp_dir.path().join(ARENA_FILE_NAME).exists());
    assert!(temp_dir.path().join(MAPPING_FILE_NAME).exists());

    let reopened = VectorIndex::open(temp_dir.path(), dim()).unwrap();
    assert_eq!(ids(&reopened, &query, 3), vec!["a", "b"]);
    assert!(!reopened.contains("c"));
    assert_eq!(reopened.get("b").unwrap().price, 42.0);
    assert_eq!(reopened.get("a").unwrap().brand, "Zara");

    let stats = reopened.stats();
    assert_eq!(stats.live_vectors, 2);
    assert_eq!(stats.tombstones, 1);
}

#[test]
fn test_compaction_preserves_results_and_persists() {
    let temp_dir = TempDir::new().unwrap();
    let query = vec![0.5, 0.5, 0.5, 0.5];

    let before = {
        let index = VectorIndex::open(temp_dir.path(), dim()).unwrap();
        for i in 0..4 {
            index
                .add(&format!("p{i}"), &basis(i), ProductRecord::new(""))
                .unwrap();
        }
        index.remove("p1").unwrap();
        index.remove("p1").unwrap();
        let before = ids(&index, &query, 10);

        assert_eq!(index.compact().unwrap(), 1);
        assert_eq!(ids(&index, &query, 10), before);
        assert_eq!(index.compact().unwrap(), 0);
        before
    };

    let reopened = VectorIndex::open(temp_dir.path(), dim()).unwrap();
    let stats = reopened.stats();
    assert_eq!(stats.total_slots, 3);
    assert_eq!(stats.tombstones, 0);
    assert_eq!(stats.epoch, 1);
    assert_eq!(ids(&reopened, &query, 10), before);
}

#[test]
fn test_rejected_add_leaves_artifacts_unchanged() {
    let temp_dir = TempDir::new().unwrap();
    let index = VectorIndex::open(temp_dir.path(), dim()).unwrap();
    index.add("a", &basis(0), ProductRecord::new("a")).unwrap();

    let arena_before = std::fs::read(temp_dir.path().join(ARENA_FILE_NAME)).unwrap();
    let mapping_before = std::fs::read(temp_dir.path().join(MAPPING_FILE_NAME)).unwrap();

    let err = index
        .add("b", &[1.0, 0.0, 0.0], ProductRecord::new("b"))
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidVector(_)));
    assert_eq!(err.category(), ErrorCategory::InvalidInput);

    assert_eq!(
        std::fs::read(temp_dir.path().join(ARENA_FILE_NAME)).unwrap(),
        arena_before
    );
    assert_eq!(
        std::fs::read(temp_dir.path().join(MAPPING_FILE_NAME)).unwrap(),
        mapping_before
    );
    assert_eq!(index.len(), 1);
}

#[test]
fn test_reopen_with_other_dimension_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    {
        let index = VectorIndex::open(temp_dir.path(), dim()).unwrap();
        index.add("a", &basis(0), ProductRecord::new("a")).unwrap();
    }

    let err = VectorIndex::open(temp_dir.path(), VectorDimension::new(8).unwrap()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Fatal);
}
