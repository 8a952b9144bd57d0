use super::*;
use crate::retrieval::extract_keywords;

fn chunk(index: usize, start: f64, end: f64, text: &str) -> Chunk {
    Chunk {
        index,
        start,
        end,
        text: text.to_string(),
        keywords: extract_keywords(text, 10),
        embedding: None,
    }
}

fn corpus() -> Vec<Chunk> {
    vec![
        chunk(0, 0.0, 60.0, "Welcome to the channel, today we cook pasta."),
        chunk(1, 60.0, 120.0, "Rust ownership rules prevent data races."),
        chunk(2, 120.0, 180.0, "Borrowing in Rust lets functions read data."),
        chunk(3, 180.0, 240.0, "Thanks for watching, subscribe for more."),
    ]
}

#[test]
fn clock_reference_parsing() {
    assert_eq!(clock_reference("at 45:30 what happened"), Some(2730.0));
    assert_eq!(clock_reference("see 1:02:05"), Some(3725.0));
    assert_eq!(clock_reference("no time here"), None);
    assert_eq!(clock_reference("ratio 3:75"), None);
}

#[test]
fn only_matching_chunks_returned() {
    let ranked = KeywordScorer::new().score("rust ownership", &corpus(), ScoreOptions::default());

    let indices: Vec<usize> = ranked.iter().map(|r| r.chunk.index).collect();
    assert_eq!(indices, vec![1, 2]);
}

#[test]
fn exact_phrase_outranks_keyword_overlap() {
    let chunks = vec![
        chunk(0, 0.0, 10.0, "data races data races data races"),
        chunk(1, 10.0, 20.0, "the borrow checker prevents data races entirely"),
    ];
    let ranked = KeywordScorer::new().score(
        "prevents data races",
        &chunks,
        ScoreOptions::default(),
    );

    assert_eq!(ranked[0].chunk.index, 1);
    assert!(ranked[0].score > ranked[1].score);
}

#[test]
fn ties_keep_transcript_order() {
    let chunks = vec![
        chunk(0, 0.0, 10.0, "alpha beta"),
        chunk(1, 10.0, 20.0, "alpha gamma"),
        chunk(2, 20.0, 30.0, "alpha delta"),
    ];
    let ranked = KeywordScorer::new().score("alpha", &chunks, ScoreOptions::default());

    let indices: Vec<usize> = ranked.iter().map(|r| r.chunk.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[test]
fn timestamp_reference_boosts_nearby_chunks() {
    let ranked = KeywordScorer::new().score("subscribe at 3:30", &corpus(), ScoreOptions::default());

    assert_eq!(ranked[0].chunk.index, 3);
    assert!(ranked.iter().all(|r| r.score > 0.0 && r.score <= 1.0));
}

#[test]
fn stop_word_only_query_matches_nothing() {
    let ranked = KeywordScorer::new().score("what is the", &corpus(), ScoreOptions::default());
    assert!(ranked.is_empty());
}
