use super::*;
use tempfile::TempDir;

const COLLECTION: &str = "knowledge_documents";

async fn create_test_store() -> (VectorStore, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let uri = temp_dir.path().join("vectors");
    let store = VectorStore::connect(&uri.display().to_string(), COLLECTION)
        .await
        .expect("should create vector store");
    (store, temp_dir)
}

fn chunks(count: usize) -> Vec<Chunk> {
    (0..count)
        .map(|index| {
            let text = format!("chunk number {}", index);
            Chunk {
                index,
                start: index * 10,
                end: index * 10 + text.chars().count(),
                text,
            }
        })
        .collect()
}

/// Deterministic, pairwise distinct vectors
fn embeddings(count: usize, dimension: usize) -> Vec<Vec<f32>> {
    (0..count)
        .map(|i| {
            (0..dimension)
                .map(|j| ((i * 31 + j * 7) % 17) as f32 / 17.0 + if j == i { 1.0 } else { 0.0 })
                .collect()
        })
        .collect()
}

fn unit(dimension: usize, axis: usize) -> Vec<f32> {
    (0..dimension)
        .map(|j| if j == axis { 1.0 } else { 0.0 })
        .collect()
}

#[tokio::test]
async fn new_store_has_no_collection() {
    let (store, _temp_dir) = create_test_store().await;

    assert_eq!(store.collection_name(), COLLECTION);
    assert_eq!(store.dimension(), None);
    assert!(store.check_connection().await);
    assert!(
        store
            .collection_info()
            .await
            .expect("should get info")
            .is_none()
    );
    assert_eq!(store.count_points(None).await.expect("should count"), 0);
}

#[tokio::test]
async fn insert_then_search_returns_every_chunk() {
    let (store, _temp_dir) = create_test_store().await;
    let kb_id = Uuid::new_v4();
    let doc_id = Uuid::new_v4();
    let vectors = embeddings(5, 1024);

    let inserted = store
        .insert(kb_id, doc_id, &chunks(5), &vectors)
        .await
        .expect("should insert");
    assert_eq!(inserted, 5);
    assert_eq!(store.dimension(), Some(1024));

    let params = SearchParams::new(5).with_kb(kb_id).with_threshold(0.0);
    let outcome = store.search(&vectors[0], &params).await;
    assert!(!outcome.is_degraded(), "{:?}", outcome.reason());

    let hits = outcome.into_value();
    assert_eq!(hits.len(), 5);
    let mut indices: Vec<u32> = hits.iter().map(|h| h.chunk_index).collect();
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    assert_eq!(hits[0].chunk_index, 0);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(hits.iter().all(|h| h.doc_id == doc_id && h.kb_id == kb_id));
}

#[tokio::test]
async fn arity_mismatch_writes_nothing() {
    let (store, _temp_dir) = create_test_store().await;
    let kb_id = Uuid::new_v4();

    store
        .insert(kb_id, Uuid::new_v4(), &chunks(2), &embeddings(2, 8))
        .await
        .expect("should insert");

    let result = store
        .insert(kb_id, Uuid::new_v4(), &chunks(3), &embeddings(2, 8))
        .await;

    assert!(matches!(
        result,
        Err(RagError::ArityMismatch {
            chunks: 3,
            embeddings: 2
        })
    ));
    assert_eq!(store.count_points(None).await.expect("should count"), 2);
}

#[tokio::test]
async fn empty_insert_is_a_no_op() {
    let (store, _temp_dir) = create_test_store().await;

    let inserted = store
        .insert(Uuid::new_v4(), Uuid::new_v4(), &[], &[])
        .await
        .expect("should succeed");

    assert_eq!(inserted, 0);
    assert_eq!(store.dimension(), None);
    assert!(
        store
            .collection_info()
            .await
            .expect("should get info")
            .is_none()
    );
}

#[tokio::test]
async fn mixed_dimensions_in_one_batch_are_rejected() {
    let (store, _temp_dir) = create_test_store().await;
    let vectors = vec![vec![0.1, 0.2, 0.3], vec![0.1, 0.2]];

    let result = store
        .insert(Uuid::new_v4(), Uuid::new_v4(), &chunks(2), &vectors)
        .await;

    assert!(matches!(
        result,
        Err(RagError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
    assert_eq!(store.dimension(), None);
}

#[tokio::test]
async fn dimension_is_fixed_by_first_insert() {
    let (store, _temp_dir) = create_test_store().await;
    let kb_id = Uuid::new_v4();

    store
        .insert(kb_id, Uuid::new_v4(), &chunks(3), &embeddings(3, 4))
        .await
        .expect("should insert");

    let result = store
        .insert(kb_id, Uuid::new_v4(), &chunks(2), &embeddings(2, 6))
        .await;

    assert!(matches!(
        result,
        Err(RagError::DimensionMismatch {
            expected: 4,
            actual: 6
        })
    ));
    assert_eq!(store.count_points(None).await.expect("should count"), 3);
}

#[tokio::test]
async fn ensure_collection_is_idempotent() {
    let (store, temp_dir) = create_test_store().await;

    store
        .ensure_collection(16, DistanceMetric::Cosine)
        .await
        .expect("should create");
    store
        .ensure_collection(16, DistanceMetric::Cosine)
        .await
        .expect("second call should be a no-op");
    assert!(matches!(
        store.ensure_collection(32, DistanceMetric::Cosine).await,
        Err(RagError::DimensionMismatch {
            expected: 16,
            actual: 32
        })
    ));
    assert!(matches!(
        store.ensure_collection(0, DistanceMetric::Cosine).await,
        Err(RagError::InvalidInput(_))
    ));

    let info = store
        .collection_info()
        .await
        .expect("should get info")
        .expect("collection should exist");
    assert_eq!(info.dimension, 16);
    assert_eq!(info.points_count, 0);
    assert_eq!(info.metric, DistanceMetric::Cosine);

    // A fresh handle picks the dimension up from the table schema
    let uri = temp_dir.path().join("vectors").display().to_string();
    let other = VectorStore::connect(&uri, COLLECTION)
        .await
        .expect("should reconnect");
    assert_eq!(other.dimension(), Some(16));
}

#[tokio::test]
async fn search_is_scoped_to_knowledge_base() {
    let (store, _temp_dir) = create_test_store().await;
    let kb_a = Uuid::new_v4();
    let kb_b = Uuid::new_v4();

    store
        .insert(kb_a, Uuid::new_v4(), &chunks(3), &embeddings(3, 8))
        .await
        .expect("should insert");
    store
        .insert(kb_b, Uuid::new_v4(), &chunks(2), &embeddings(2, 8))
        .await
        .expect("should insert");

    let params = SearchParams::new(10).with_kb(kb_b).with_threshold(0.0);
    let hits = store.search(&unit(8, 0), &params).await.into_value();

    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.kb_id == kb_b));

    let unscoped = store
        .search(&unit(8, 0), &SearchParams::new(10).with_threshold(0.0))
        .await
        .into_value();
    assert_eq!(unscoped.len(), 5);
}

#[tokio::test]
async fn search_falls_back_when_threshold_is_too_strict() {
    let (store, _temp_dir) = create_test_store().await;
    let kb_id = Uuid::new_v4();
    let vectors = vec![unit(4, 0), unit(4, 1), unit(4, 2)];

    store
        .insert(kb_id, Uuid::new_v4(), &chunks(3), &vectors)
        .await
        .expect("should insert");

    let query = vec![0.9, 0.4, 0.1, 0.0];
    let params = SearchParams::new(2).with_kb(kb_id).with_threshold(0.99);
    let hits = store.search(&query, &params).await.into_value();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk_index, 0);
    assert_eq!(hits[1].chunk_index, 1);
    assert!(hits.iter().all(|h| h.score < 0.99));
}

#[tokio::test]
async fn search_without_collection_is_empty() {
    let (store, _temp_dir) = create_test_store().await;

    let outcome = store.search(&[1.0, 0.0], &SearchParams::new(5)).await;

    assert!(!outcome.is_degraded());
    assert!(outcome.value().is_empty());
}

#[tokio::test]
async fn search_with_wrong_dimension_is_degraded() {
    let (store, _temp_dir) = create_test_store().await;
    store
        .insert(Uuid::new_v4(), Uuid::new_v4(), &chunks(2), &embeddings(2, 8))
        .await
        .expect("should insert");

    let outcome = store.search(&[1.0, 0.0], &SearchParams::new(5)).await;

    assert!(outcome.is_degraded());
    assert!(outcome.value().is_empty());
    assert!(
        outcome
            .reason()
            .is_some_and(|reason| reason.contains("Dimension mismatch"))
    );
}

#[tokio::test]
async fn delete_by_document_removes_only_its_points() {
    let (store, _temp_dir) = create_test_store().await;
    let kb_id = Uuid::new_v4();
    let keep = Uuid::new_v4();
    let remove = Uuid::new_v4();

    store
        .insert(kb_id, keep, &chunks(2), &embeddings(2, 8))
        .await
        .expect("should insert");
    store
        .insert(kb_id, remove, &chunks(3), &embeddings(3, 8))
        .await
        .expect("should insert");

    let outcome = store.delete_by_document(remove).await;
    assert_eq!(outcome, StoreOutcome::Complete(true));

    assert_eq!(
        store
            .count_points(Some(PointFilter::Document(remove)))
            .await
            .expect("should count"),
        0
    );
    assert_eq!(
        store
            .count_points(Some(PointFilter::Document(keep)))
            .await
            .expect("should count"),
        2
    );
    assert_eq!(
        store
            .count_points(Some(PointFilter::KnowledgeBase(kb_id)))
            .await
            .expect("should count"),
        2
    );

    let params = SearchParams::new(10).with_kb(kb_id).with_threshold(0.0);
    for query in embeddings(3, 8) {
        let outcome = store.search(&query, &params).await;
        assert!(!outcome.is_degraded());
        let hits = outcome.into_value();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|hit| hit.doc_id == keep));
    }

    let again = store.delete_by_document(remove).await;
    assert_eq!(again, StoreOutcome::Complete(true));
}

#[tokio::test]
async fn delete_without_collection_succeeds() {
    let (store, _temp_dir) = create_test_store().await;

    let outcome = store.delete_by_document(Uuid::new_v4()).await;
    assert_eq!(outcome, StoreOutcome::Complete(true));
}

#[tokio::test]
async fn payload_survives_round_trip() {
    let (store, _temp_dir) = create_test_store().await;
    let kb_id = Uuid::new_v4();
    let doc_id = Uuid::new_v4();
    let chunk = Chunk {
        index: 0,
        start: 0,
        end: 11,
        text: "Grüße, Welt".to_string(),
    };

    store
        .insert(kb_id, doc_id, std::slice::from_ref(&chunk), &[unit(4, 3)])
        .await
        .expect("should insert");

    let hits = store
        .search(&unit(4, 3), &SearchParams::new(1))
        .await
        .into_value();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, chunk.text);
    assert_eq!(hits[0].doc_id, doc_id);
    assert_eq!(hits[0].kb_id, kb_id);
    assert!((hits[0].score - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn optimize_after_writes() {
    let (store, _temp_dir) = create_test_store().await;
    store
        .optimize()
        .await
        .expect("optimize without collection is a no-op");

    let kb_id = Uuid::new_v4();
    for _ in 0..3 {
        store
            .insert(kb_id, Uuid::new_v4(), &chunks(2), &embeddings(2, 8))
            .await
            .expect("should insert");
    }

    store.optimize().await.expect("should optimize");
    assert_eq!(store.count_points(None).await.expect("should count"), 6);
}
