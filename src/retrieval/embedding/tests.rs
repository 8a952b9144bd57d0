use anyhow::anyhow;

use super::*;

fn chunk(index: usize, text: &str) -> Chunk {
    Chunk {
        index,
        start: index as f64 * 60.0,
        end: (index + 1) as f64 * 60.0,
        text: text.to_string(),
        keywords: Vec::new(),
        embedding: None,
    }
}

fn filler(count: usize) -> Vec<Chunk> {
    (0..count)
        .map(|i| chunk(i, "cooking pasta sauce recipe tomatoes"))
        .collect()
}

struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn name(&self) -> &str {
        "failing"
    }

    fn dimensions(&self) -> usize {
        8
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(anyhow!("model unavailable"))
    }
}

#[test]
fn hash_embedder_is_deterministic_and_normalized() {
    let embedder = HashEmbedder::default();
    let a = embedder.embed("neural networks learn features").expect("should embed");
    let b = embedder.embed("neural networks learn features").expect("should embed");

    assert_eq!(a, b);
    assert_eq!(a.len(), DEFAULT_EMBEDDING_DIMENSIONS);
    let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
}

#[test]
fn stop_words_embed_to_zero_vector() {
    let vector = HashEmbedder::new(16).embed("what is the").expect("should embed");
    assert!(vector.iter().all(|v| *v == 0.0));
}

#[test]
fn cosine_similarity_edge_cases() {
    assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
}

#[test]
fn build_embeds_every_chunk() {
    let index = EmbeddingIndex::build(filler(4), Arc::new(HashEmbedder::default()))
        .expect("should build index");

    assert!(index.chunks().iter().all(|c| c.embedding.is_some()));

    let stats = index.stats();
    assert_eq!(stats.total_chunks, 4);
    assert_eq!(stats.embedded_chunks, 4);
    assert_eq!(stats.dimensions, DEFAULT_EMBEDDING_DIMENSIONS);
    assert_eq!(stats.estimated_bytes, 4 * DEFAULT_EMBEDDING_DIMENSIONS * 4);
    assert_eq!(stats.method, "hashed-tf");
}

#[test]
fn build_fails_when_embedder_fails() {
    let result = EmbeddingIndex::build(filler(2), Arc::new(FailingEmbedder));
    assert!(result.is_err());
}

#[test]
fn scorer_keeps_only_similar_chunks() {
    let mut chunks = filler(3);
    chunks.push(chunk(3, "gradient descent optimizer tuning explained"));

    let scorer = EmbeddingScorer::new(Arc::new(HashEmbedder::default()));
    let ranked = scorer.score("gradient descent tuning", &chunks, ScoreOptions::default());

    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].chunk.index, 3);
    assert!(ranked[0].score > 0.0 && ranked[0].score <= 1.0);
}

#[test]
fn exact_phrase_doubles_similarity() {
    let chunks = vec![
        chunk(0, "tuning gradient descent explained optimizer"),
        chunk(1, "gradient descent tuning explained optimizer"),
    ];
    let scorer = EmbeddingScorer::new(Arc::new(HashEmbedder::default()));
    let ranked = scorer.score("gradient descent tuning", &chunks, ScoreOptions::default());

    // Same bag of words, only chunk 1 contains the phrase verbatim
    assert_eq!(ranked[0].chunk.index, 1);
    assert!((ranked[0].score - 2.0 * ranked[1].score).abs() < 1e-6);
}

#[test]
fn prefer_recent_favors_trailing_chunks() {
    let mut chunks = filler(12);
    chunks[0].text = "backpropagation computes weight gradients".to_string();
    chunks[11].text = "backpropagation computes weight gradients".to_string();

    let scorer = EmbeddingScorer::new(Arc::new(HashEmbedder::default()));
    let query = "how backpropagation computes gradients";

    let neutral = scorer.score(query, &chunks, ScoreOptions::default());
    assert_eq!(neutral[0].chunk.index, 0);

    let recent = scorer.score(query, &chunks, ScoreOptions { prefer_recent: true });
    assert_eq!(recent[0].chunk.index, 11);
}

#[test]
fn search_backfills_across_video() {
    let mut chunks = filler(10);
    chunks[4].text = "transformers use attention layers".to_string();
    let index = EmbeddingIndex::build(chunks, Arc::new(HashEmbedder::default()))
        .expect("should build index");

    let results = index.search("attention layers", 5, ScoreOptions::default());

    assert_eq!(results.len(), 5);
    assert!(results.iter().any(|r| r.chunk.index == 4));
    assert!(results.windows(2).all(|w| w[0].chunk.start <= w[1].chunk.start));
}

#[test]
fn failing_query_embedding_scores_nothing() {
    let scorer = EmbeddingScorer::new(Arc::new(FailingEmbedder));
    assert!(scorer.score("anything", &filler(3), ScoreOptions::default()).is_empty());
}
