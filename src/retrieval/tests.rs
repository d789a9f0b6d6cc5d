use super::*;
use crate::embeddings::HashingEmbedder;
use crate::index::{DistanceMetric, FlatFactory};

fn record(category: &str, ordinal: usize, question: &str, answer: &str) -> QARecord {
    QARecord {
        id: format!("{}#{}", category, ordinal),
        category: category.to_string(),
        question: question.to_string(),
        answer: answer.to_string(),
    }
}

fn sample_records() -> Vec<QARecord> {
    vec![
        record("shipping", 0, "How long does shipping take?", "3-5 business days."),
        record("shipping", 1, "Do you ship internationally?", "Yes, to 30 countries."),
        record("refunds", 0, "How do I request a refund?", "Use the returns form."),
        record("payments", 0, "Which payment methods are accepted?", "Cards and PayPal."),
    ]
}

fn retriever() -> Retriever {
    Retriever::new(
        Arc::new(HashingEmbedder::new(256).expect("valid dimension")),
        Arc::new(FlatFactory {
            metric: DistanceMetric::Euclidean,
        }),
    )
}

/// Declares one dimension but produces another
struct BrokenEmbedder;

impl Embedder for BrokenEmbedder {
    fn model_id(&self) -> &str {
        "broken"
    }

    fn dimension(&self) -> usize {
        4
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![0.0; 3])
    }
}

struct OfflineEmbedder;

impl Embedder for OfflineEmbedder {
    fn model_id(&self) -> &str {
        "offline"
    }

    fn dimension(&self) -> usize {
        4
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(FaqError::EmbeddingUnavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn exact_question_matches_with_zero_distance() {
    let retriever = retriever();
    retriever
        .rebuild(sample_records())
        .await
        .expect("rebuild succeeds");

    let result = retriever
        .search("Do you ship internationally?")
        .await
        .expect("search succeeds");

    assert_eq!(result.record_id, "shipping#1");
    assert_eq!(result.matched_answer, "Yes, to 30 countries.");
    assert!(result.distance.abs() < 1e-6);
}

#[tokio::test]
async fn top_k_is_ordered_and_bounded() {
    let retriever = retriever();
    retriever
        .rebuild(sample_records())
        .await
        .expect("rebuild succeeds");

    let results = retriever
        .search_top_k("how long is shipping", 3)
        .await
        .expect("search succeeds");
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].record_id, "shipping#0");
    assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));

    let all = retriever
        .search_top_k("how long is shipping", 10)
        .await
        .expect("search succeeds");
    assert_eq!(all.len(), 4);

    let none = retriever
        .search_top_k("how long is shipping", 0)
        .await
        .expect("search succeeds");
    assert!(none.is_empty());
}

#[tokio::test]
async fn empty_index_fails_with_empty_index() {
    let retriever = retriever();
    assert!(matches!(
        retriever.search("anything").await,
        Err(FaqError::EmptyIndex)
    ));

    retriever.rebuild(Vec::new()).await.expect("empty rebuild");
    assert!(matches!(
        retriever.search("anything").await,
        Err(FaqError::EmptyIndex)
    ));
}

#[tokio::test]
async fn rebuild_swaps_snapshot() {
    let retriever = retriever();
    retriever
        .rebuild(sample_records())
        .await
        .expect("rebuild succeeds");
    let first_generation = retriever.generation().await;

    retriever
        .rebuild(vec![record("loyalty", 0, "How do loyalty points work?", "1 point per euro.")])
        .await
        .expect("rebuild succeeds");

    assert_ne!(retriever.generation().await, first_generation);
    assert_eq!(retriever.len().await, 1);

    let result = retriever
        .search("Do you ship internationally?")
        .await
        .expect("search succeeds");
    assert_eq!(result.record_id, "loyalty#0");
}

#[tokio::test]
async fn failed_rebuild_keeps_serving_old_snapshot() {
    let retriever = Retriever::new(
        Arc::new(BrokenEmbedder),
        Arc::new(FlatFactory {
            metric: DistanceMetric::Euclidean,
        }),
    );

    let result = retriever.rebuild(sample_records()).await;
    assert!(matches!(
        result,
        Err(FaqError::DimensionMismatch {
            expected: 4,
            actual: 3
        })
    ));
    assert!(retriever.is_empty().await);

    let healthy = self::retriever();
    healthy
        .rebuild(sample_records())
        .await
        .expect("rebuild succeeds");
    let records = sample_records();
    let duplicate = vec![records[0].clone(), records[0].clone()];
    assert!(healthy.rebuild(duplicate).await.is_err());
    assert_eq!(healthy.len().await, 4);
}

#[tokio::test]
async fn query_vector_dimension_is_checked() {
    let retriever = retriever();
    retriever
        .rebuild(sample_records())
        .await
        .expect("rebuild succeeds");

    assert!(matches!(
        retriever.search_vector(&[0.0; 8], 1).await,
        Err(FaqError::DimensionMismatch {
            expected: 256,
            actual: 8
        })
    ));
}

#[tokio::test]
async fn unavailable_embedder_is_fatal_to_rebuild() {
    let retriever = Retriever::new(
        Arc::new(OfflineEmbedder),
        Arc::new(FlatFactory {
            metric: DistanceMetric::Euclidean,
        }),
    );

    assert!(matches!(
        retriever.rebuild(sample_records()).await,
        Err(FaqError::EmbeddingUnavailable(_))
    ));
}

#[tokio::test]
async fn upsert_replaces_and_appends() {
    let retriever = retriever();
    retriever
        .rebuild(sample_records())
        .await
        .expect("rebuild succeeds");

    retriever
        .upsert(record("shipping", 0, "What are the delivery times?", "Next day."))
        .await
        .expect("upsert succeeds");
    assert_eq!(retriever.len().await, 4);

    let result = retriever
        .search("What are the delivery times?")
        .await
        .expect("search succeeds");
    assert_eq!(result.record_id, "shipping#0");
    assert_eq!(result.matched_answer, "Next day.");

    retriever
        .upsert(record("gifts", 0, "Do you sell gift cards?", "Yes."))
        .await
        .expect("upsert succeeds");
    assert_eq!(retriever.len().await, 5);
}

#[tokio::test]
async fn upsert_into_empty_retriever_creates_snapshot() {
    let retriever = retriever();
    retriever
        .upsert(record("gifts", 0, "Do you sell gift cards?", "Yes."))
        .await
        .expect("upsert succeeds");

    let result = retriever
        .search("gift cards")
        .await
        .expect("search succeeds");
    assert_eq!(result.record_id, "gifts#0");
}

#[tokio::test]
async fn concurrent_queries_during_rebuild_see_a_complete_snapshot() {
    let retriever = Arc::new(retriever());
    retriever
        .rebuild(sample_records())
        .await
        .expect("rebuild succeeds");

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let retriever = Arc::clone(&retriever);
            tokio::spawn(async move { retriever.search_top_k("refund", 2).await })
        })
        .collect();

    retriever
        .rebuild(sample_records())
        .await
        .expect("rebuild succeeds");

    for reader in readers {
        let results = reader
            .await
            .expect("reader task completes")
            .expect("search succeeds");
        assert_eq!(results.len(), 2);
    }
}

#[test]
fn within_applies_optional_threshold() {
    let result = RetrievalResult {
        record_id: "a#0".to_string(),
        category: "a".to_string(),
        matched_question: "q".to_string(),
        matched_answer: "x".to_string(),
        distance: 0.4,
    };

    assert!(result.within(None));
    assert!(result.within(Some(0.5)));
    assert!(!result.within(Some(0.3)));
}
