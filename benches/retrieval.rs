use criterion::{Criterion, criterion_group, criterion_main};
use faq_rag::embeddings::{Embedder, HashingEmbedder};
use faq_rag::index::{DistanceMetric, FlatIndex, IndexEntry, VectorBackend};
use std::hint::black_box;

const TOPICS: &[&str] = &[
    "shipping", "delivery", "refund", "return", "payment", "account", "password", "order",
    "invoice", "warranty", "discount", "subscription",
];

fn synthetic_questions(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let a = TOPICS[i % TOPICS.len()];
            let b = TOPICS[(i / TOPICS.len()) % TOPICS.len()];
            format!("How does {} work together with my {} number {}?", a, b, i)
        })
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let embedder = HashingEmbedder::new(768).expect("valid dimension");
    let runtime = tokio::runtime::Runtime::new().expect("can start runtime");

    let questions = synthetic_questions(2_000);
    let vectors = embedder
        .embed_batch(&questions)
        .expect("hashing embedder never fails");

    for metric in [DistanceMetric::Euclidean, DistanceMetric::Cosine] {
        let mut index = FlatIndex::new(metric);
        let entries = vectors
            .iter()
            .enumerate()
            .map(|(i, vector)| IndexEntry {
                id: format!("bench#{}", i),
                vector: vector.clone(),
            })
            .collect();
        runtime
            .block_on(index.build(entries))
            .expect("index builds");

        let query = embedder
            .embed("How long does shipping take for my order?")
            .expect("hashing embedder never fails");

        c.bench_function(&format!("flat_search_top3_{}", metric), |b| {
            b.iter(|| index.search(black_box(&query), black_box(3)));
        });
    }

    c.bench_function("hashing_embed_question", |b| {
        b.iter(|| embedder.embed(black_box("Can I return an item bought on discount?")));
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
