use super::*;

fn alphabet_text(len: usize) -> String {
    "abcdefghijklmnopqrstuvwxyz".chars().cycle().take(len).collect()
}

fn prose_text() -> String {
    let paragraph = "Rust is a systems programming language. It guarantees memory safety without a garbage collector! Does it also prevent data races? Yes, through ownership and borrowing.";
    [paragraph; 6].join("\n\n")
}

fn assert_invariants(text: &str, max_len: usize, overlap: usize) {
    let chunks = split(text, max_len, overlap).expect("split should succeed");

    assert!(!chunks.is_empty(), "non-empty text must produce chunks");
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.index, i, "indices must be contiguous");
        assert!(
            chunk.text.chars().count() <= max_len,
            "chunk {} has {} chars, max is {}",
            i,
            chunk.text.chars().count(),
            max_len
        );
        assert_eq!(chunk.char_len(), chunk.text.chars().count());
    }
    for pair in chunks.windows(2) {
        assert_eq!(pair[1].start, pair[0].end - overlap);
        assert!(pair[1].start > pair[0].start);
    }
    assert_eq!(reassemble(&chunks, overlap), text);
}

#[test]
fn hard_cut_produces_fixed_stride() {
    let text = alphabet_text(1200);

    let chunks = split(&text, 500, 100).expect("split should succeed");

    assert_eq!(chunks.len(), 3);
    assert_eq!(
        chunks.iter().map(|c| (c.start, c.end)).collect::<Vec<_>>(),
        vec![(0, 500), (400, 900), (800, 1200)]
    );
    for pair in chunks.windows(2) {
        let tail: String = pair[0].text.chars().skip(400).collect();
        let head: String = pair[1].text.chars().take(100).collect();
        assert_eq!(tail.chars().count(), 100);
        assert_eq!(tail, head);
    }
}

#[test]
fn short_text_is_single_chunk() {
    let chunks = split("hello world", 500, 100).expect("split should succeed");

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "hello world");
    assert_eq!(chunks[0].index, 0);
}

#[test]
fn empty_text_produces_no_chunks() {
    let chunks = split("", 500, 0).expect("split should succeed");
    assert!(chunks.is_empty());
}

#[test]
fn prefers_paragraph_boundary() {
    let first = "a".repeat(300);
    let second = "b".repeat(300);
    let text = format!("{first}\n\n{second}");

    let chunks = split(&text, 500, 0).expect("split should succeed");

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].text, format!("{first}\n\n"));
    assert_eq!(chunks[1].text, second);
}

#[test]
fn early_boundary_does_not_cut_a_sliver() {
    let text = format!("{}\n\n{}", "a".repeat(100), "b".repeat(600));

    let chunks = split(&text, 500, 0).expect("split should succeed");

    assert_eq!(chunks[0].end, 500);
    assert!(chunks[0].text.starts_with(&format!("{}\n\n", "a".repeat(100))));
}

#[test]
fn prefers_sentence_over_word_boundary() {
    let text = format!("{}. {}", "word ".repeat(60).trim_end(), "tail ".repeat(60));

    let chunks = split(&text, 400, 0).expect("split should succeed");

    assert!(chunks.len() >= 2);
    assert!(
        chunks[0].text.ends_with('.'),
        "first chunk should end at the sentence: {:?}",
        chunks[0].text
    );
}

#[test]
fn falls_back_to_whitespace() {
    let text = "lorem ipsum dolor sit amet ".repeat(40);

    let chunks = split(&text, 100, 10).expect("split should succeed");

    for chunk in &chunks[..chunks.len() - 1] {
        assert!(
            chunk.text.ends_with(' '),
            "chunk should end after whitespace: {:?}",
            chunk.text
        );
    }
}

#[test]
fn invariants_hold_for_prose() {
    let text = prose_text();
    for (max_len, overlap) in [(50, 0), (80, 20), (120, 119), (200, 50), (500, 100), (1, 0)] {
        assert_invariants(&text, max_len, overlap);
    }
}

#[test]
fn invariants_hold_for_multibyte_text() {
    let text = "Grüße aus Köln. 日本語の文章です。もう一つの文。 ".repeat(30);
    for (max_len, overlap) in [(16, 4), (64, 8), (100, 0)] {
        assert_invariants(&text, max_len, overlap);
    }
}

#[test]
fn deterministic_output() {
    let text = prose_text();
    let first = split(&text, 120, 30).expect("split should succeed");
    let second = split(&text, 120, 30).expect("split should succeed");
    assert_eq!(first, second);
}

#[test]
fn rejects_invalid_parameters() {
    assert!(matches!(split("text", 0, 0), Err(RagError::Config(_))));
    assert!(matches!(split("text", 10, 10), Err(RagError::Config(_))));
    assert!(matches!(split("text", 10, 11), Err(RagError::Config(_))));
}

#[test]
fn chunk_text_uses_config() {
    let config = ChunkingConfig {
        max_len: 500,
        overlap: 100,
    };
    let chunks = chunk_text(&alphabet_text(1200), &config).expect("chunking should succeed");
    assert_eq!(chunks.len(), 3);
}
