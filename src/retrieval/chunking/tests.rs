use super::*;
use crate::transcript::transcript_text;

fn lecture(segment_count: usize) -> Vec<TranscriptSegment> {
    (0..segment_count)
        .map(|i| {
            TranscriptSegment::new(
                i as f64 * 5.0,
                5.0,
                format!(
                    "Segment {} talks about gradient descent and learning rates. It continues here",
                    i
                ),
            )
        })
        .collect()
}

fn words(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

#[test]
fn empty_transcript_yields_single_chunk() {
    let chunks = chunk_transcript(&[], &ChunkingConfig::default());
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].index, 0);
}

#[test]
fn single_segment_yields_single_chunk() {
    let segments = vec![TranscriptSegment::new(3.0, 4.0, "Only one line here.")];
    let chunks = chunk_transcript(&segments, &ChunkingConfig::default());

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "Only one line here.");
    assert!((chunks[0].start - 3.0).abs() < f64::EPSILON);
    assert!((chunks[0].end - 7.0).abs() < f64::EPSILON);
}

#[test]
fn long_transcript_is_split_near_target_size() {
    let config = ChunkingConfig {
        target_chunk_chars: 400,
        overlap_chars: 0,
    };
    let chunks = chunk_transcript(&lecture(40), &config);

    assert!(chunks.len() > 1);
    for chunk in &chunks {
        assert!(!chunk.text.is_empty());
        assert!(chunk.text.chars().count() <= 400);
    }
}

#[test]
fn chunks_are_contiguous_and_ordered() {
    let config = ChunkingConfig {
        target_chunk_chars: 300,
        overlap_chars: 50,
    };
    let segments = lecture(30);
    let chunks = chunk_transcript(&segments, &config);

    for (i, pair) in chunks.windows(2).enumerate() {
        assert!((pair[0].end - pair[1].start).abs() < f64::EPSILON);
        assert!(pair[0].start <= pair[1].start);
        assert_eq!(pair[0].index, i);
    }
    assert!(chunks[0].start.abs() < f64::EPSILON);
    let last = chunks.last().expect("at least one chunk");
    assert!((last.end - 150.0).abs() < f64::EPSILON);
}

#[test]
fn without_overlap_chunks_reproduce_transcript() {
    let config = ChunkingConfig {
        target_chunk_chars: 250,
        overlap_chars: 0,
    };
    let segments = lecture(25);
    let chunks = chunk_transcript(&segments, &config);

    let rebuilt = chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    assert_eq!(words(&rebuilt), words(&transcript_text(&segments)));
}

#[test]
fn overlap_repeats_tail_of_previous_chunk() {
    let config = ChunkingConfig {
        target_chunk_chars: 300,
        overlap_chars: 40,
    };
    let chunks = chunk_transcript(&lecture(20), &config);
    assert!(chunks.len() > 2);

    let previous_tail: String = {
        let text = &chunks[0].text;
        let total = text.chars().count();
        text.chars().skip(total - 40).collect()
    };
    assert!(chunks[1].text.starts_with(previous_tail.trim()));
}

#[test]
fn sentence_boundary_preferred_when_late_in_buffer() {
    let (closed, remainder) = split_at_sentence("aaaaaaaaaaaaaaaaaaaa. bbb");
    assert_eq!(closed, "aaaaaaaaaaaaaaaaaaaa.");
    assert_eq!(remainder, " bbb");

    let (closed, remainder) = split_at_sentence("aa. bbbbbbbbbbbbbbbbbbbbbbbb");
    assert_eq!(closed, "aa. bbbbbbbbbbbbbbbbbbbbbbbb");
    assert!(remainder.is_empty());
}

#[test]
fn blank_segments_are_ignored() {
    let segments = vec![
        TranscriptSegment::new(0.0, 1.0, "  "),
        TranscriptSegment::new(1.0, 1.0, "real words"),
    ];
    let chunks = chunk_transcript(&segments, &ChunkingConfig::default());
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "real words");
    assert!((chunks[0].start - 1.0).abs() < f64::EPSILON);
}

#[test]
fn chunks_carry_keywords() {
    let chunks = chunk_transcript(&lecture(5), &ChunkingConfig::default());
    assert!(chunks[0].keywords.contains(&"segment".to_string()));
    assert!(chunks[0].keywords.len() <= 10);
}

#[test]
fn oversized_segment_is_cut_at_target_size() {
    let config = ChunkingConfig {
        target_chunk_chars: 1000,
        overlap_chars: 150,
    };
    let text = "gradient descent optimizer ".repeat(200);
    let segments = vec![
        TranscriptSegment::new(0.0, 600.0, text.clone()),
        TranscriptSegment::new(600.0, 600.0, "A short closing remark."),
    ];
    let chunks = chunk_transcript(&segments, &config);

    assert!(chunks.len() >= 5);
    for chunk in &chunks {
        assert!(!chunk.text.is_empty());
        assert!(chunk.text.chars().count() <= 1000);
    }
    for pair in chunks.windows(2) {
        assert!((pair[0].end - pair[1].start).abs() < f64::EPSILON);
        assert!(pair[0].start <= pair[1].start);
    }
    assert!(chunks[0].start.abs() < f64::EPSILON);
    let last = chunks.last().expect("at least one chunk");
    assert!((last.end - 1200.0).abs() < f64::EPSILON);
    assert!(last.text.ends_with("A short closing remark."));
}

#[test]
fn forced_cut_respects_multibyte_characters() {
    let config = ChunkingConfig {
        target_chunk_chars: 100,
        overlap_chars: 0,
    };
    let segments = vec![TranscriptSegment::new(0.0, 60.0, "é".repeat(450))];
    let chunks = chunk_transcript(&segments, &config);

    assert_eq!(chunks.len(), 5);
    let total: usize = chunks.iter().map(|c| c.text.chars().count()).sum();
    assert_eq!(total, 450);
}

#[test]
fn tiny_target_still_terminates() {
    let config = ChunkingConfig {
        target_chunk_chars: 1,
        overlap_chars: 1,
    };
    let segments = vec![TranscriptSegment::new(0.0, 10.0, "word ".repeat(50))];
    let chunks = chunk_transcript(&segments, &config);

    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|c| c.text.chars().count() <= MIN_FORCED_CHUNK_CHARS));
}
