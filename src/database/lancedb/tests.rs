use super::*;

fn point(chunk_index: u32, vector: Vec<f32>) -> VectorPoint {
    VectorPoint {
        id: Uuid::new_v4(),
        vector,
        payload: PointPayload {
            kb_id: Uuid::nil(),
            doc_id: Uuid::nil(),
            chunk_index,
            text: format!("chunk {}", chunk_index),
            text_length: 7,
            created_at: Utc::now(),
        },
    }
}

#[test]
fn cosine_of_parallel_vectors_is_one() {
    let score = cosine_similarity(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]);
    assert!((score - 1.0).abs() < 1e-9);
}

#[test]
fn cosine_of_orthogonal_vectors_is_zero() {
    assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-12);
}

#[test]
fn cosine_of_opposite_vectors_is_minus_one() {
    let score = cosine_similarity(&[1.0, -1.0], &[-1.0, 1.0]);
    assert!((score + 1.0).abs() < 1e-9);
}

#[test]
fn cosine_degenerate_inputs_are_zero() {
    assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).abs() < f64::EPSILON);
    assert!(cosine_similarity(&[1.0, 1.0], &[0.0, 0.0]).abs() < f64::EPSILON);
    assert!(cosine_similarity(&[1.0], &[1.0, 0.0]).abs() < f64::EPSILON);
    assert!(cosine_similarity(&[], &[]).abs() < f64::EPSILON);
}

#[test]
fn rerank_orders_by_recomputed_score() {
    let candidates = vec![
        point(0, vec![0.0, 1.0]),
        point(1, vec![1.0, 0.0]),
        point(2, vec![1.0, 1.0]),
    ];

    let hits = rerank(&[1.0, 0.0], candidates, 3, 0.0);

    assert_eq!(
        hits.iter().map(|h| h.chunk_index).collect::<Vec<_>>(),
        vec![1, 2, 0]
    );
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert!((hits[0].score - 1.0).abs() < 1e-6);
}

#[test]
fn rerank_applies_threshold_when_enough_pass() {
    let candidates = vec![
        point(0, vec![1.0, 0.0]),
        point(1, vec![0.99, 0.1]),
        point(2, vec![0.0, 1.0]),
    ];

    let hits = rerank(&[1.0, 0.0], candidates, 2, 0.9);

    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.score >= 0.9));
}

#[test]
fn rerank_falls_back_below_threshold() {
    let candidates = vec![
        point(0, vec![0.0, 1.0]),
        point(1, vec![0.3, 1.0]),
        point(2, vec![1.0, 0.0]),
        point(3, vec![-1.0, 0.0]),
    ];

    let hits = rerank(&[1.0, 0.0], candidates, 3, 0.99);

    assert_eq!(hits.len(), 3);
    assert_eq!(
        hits.iter().map(|h| h.chunk_index).collect::<Vec<_>>(),
        vec![2, 1, 0]
    );
}

#[test]
fn rerank_returns_all_when_fewer_candidates_than_limit() {
    let candidates = vec![point(0, vec![0.1, 0.9]), point(1, vec![0.9, 0.1])];

    let hits = rerank(&[1.0, 0.0], candidates, 5, 0.99);

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk_index, 1);
}

#[test]
fn rerank_keeps_fetch_order_for_ties() {
    let candidates = vec![
        point(7, vec![1.0, 0.0]),
        point(3, vec![2.0, 0.0]),
        point(5, vec![3.0, 0.0]),
    ];

    let hits = rerank(&[1.0, 0.0], candidates, 3, 0.0);

    assert_eq!(
        hits.iter().map(|h| h.chunk_index).collect::<Vec<_>>(),
        vec![7, 3, 5]
    );
}

#[test]
fn candidate_count_over_fetches() {
    assert_eq!(SearchParams::new(5).candidate_count(), 20);
    assert_eq!(
        SearchParams::new(5)
            .with_candidate_multiplier(0)
            .candidate_count(),
        5
    );
    assert_eq!(
        SearchParams::new(usize::MAX)
            .with_candidate_multiplier(3)
            .candidate_count(),
        usize::MAX
    );
}

#[test]
fn store_outcome_accessors() {
    let complete = StoreOutcome::Complete(3);
    assert_eq!(*complete.value(), 3);
    assert!(!complete.is_degraded());
    assert_eq!(complete.reason(), None);
    assert_eq!(complete.into_value(), 3);

    let degraded = StoreOutcome::degraded(Vec::<u8>::new(), "store offline");
    assert!(degraded.is_degraded());
    assert_eq!(degraded.reason(), Some("store offline"));
    assert!(degraded.into_value().is_empty());
}

#[test]
fn filters_quote_ids() {
    let id = Uuid::nil();
    assert_eq!(
        PointFilter::Document(id).predicate(),
        "doc_id = '00000000-0000-0000-0000-000000000000'"
    );
    assert_eq!(
        PointFilter::KnowledgeBase(id).predicate(),
        "kb_id = '00000000-0000-0000-0000-000000000000'"
    );
    assert_eq!(sql_literal("it's"), "'it''s'");
}
