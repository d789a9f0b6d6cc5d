use super::*;

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[test]
fn fnv1a_matches_reference_values() {
    assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
    assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
}

#[test]
fn zero_dimension_is_rejected() {
    assert!(matches!(HashingEmbedder::new(0), Err(FaqError::Config(_))));
}

#[test]
fn embeddings_are_deterministic_and_normalised() {
    let embedder = HashingEmbedder::new(128).expect("valid dimension");
    let first = embedder.embed("How do I track my order?").expect("embeds");
    let second = embedder.embed("How do I track my order?").expect("embeds");

    assert_eq!(first, second);
    assert_eq!(first.len(), 128);

    let norm: f32 = first.iter().map(|v| v * v).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5, "norm was {}", norm);
}

#[test]
fn casing_and_punctuation_do_not_matter() {
    let embedder = HashingEmbedder::new(128).expect("valid dimension");
    let a = embedder.embed("Track my order").expect("embeds");
    let b = embedder.embed("track MY order!!").expect("embeds");
    assert_eq!(a, b);
}

#[test]
fn shared_vocabulary_is_closer() {
    let embedder = HashingEmbedder::new(256).expect("valid dimension");
    let query = embedder.embed("how long does shipping take").expect("embeds");
    let related = embedder.embed("How long does shipping take?").expect("embeds");
    let unrelated = embedder.embed("Can I pay with a gift card").expect("embeds");

    assert!(squared_l2(&query, &related) < squared_l2(&query, &unrelated));
}

#[test]
fn empty_text_yields_zero_vector() {
    let embedder = HashingEmbedder::new(16).expect("valid dimension");
    let vector = embedder.embed("   ").expect("embeds");
    assert_eq!(vector, vec![0.0; 16]);
}

#[test]
fn model_id_includes_dimension() {
    let embedder = HashingEmbedder::new(384).expect("valid dimension");
    assert_eq!(embedder.model_id(), "hashing-fnv1a-384");
    assert_eq!(embedder.dimension(), 384);
}
