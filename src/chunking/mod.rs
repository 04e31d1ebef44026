#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{RagError, Result};

/// A bounded-length slice of a document's extracted text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of this chunk within the document, 0-based and gapless
    pub index: usize,
    /// Character offset where the chunk starts
    pub start: usize,
    /// Character offset one past the end of the chunk
    pub end: usize,
    /// The chunk text
    pub text: String,
}

impl Chunk {
    /// Length in characters
    #[inline]
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

/// Configuration for text chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub max_len: usize,
    /// Characters shared between consecutive chunks
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_len: 500,
            overlap: 50,
        }
    }
}

/// Boundary kinds, in order of preference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Line,
    Sentence,
    Whitespace,
}

const BOUNDARY_PREFERENCE: [Boundary; 4] = [
    Boundary::Paragraph,
    Boundary::Line,
    Boundary::Sentence,
    Boundary::Whitespace,
];

/// Chunk text using the lengths from `config`
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    split(text, config.max_len, config.overlap)
}

/// Split `text` into overlapping chunks of at most `max_len` characters.
///
/// Each chunk ends at the latest paragraph break in its window, falling back to
/// a line break, a sentence end, whitespace, and finally a hard cut. The next
/// chunk starts `overlap` characters before the previous one ended, so dropping
/// the first `overlap` characters of every chunk but the first and concatenating
/// reproduces the input.
#[inline]
pub fn split(text: &str, max_len: usize, overlap: usize) -> Result<Vec<Chunk>> {
    if max_len == 0 {
        return Err(RagError::Config(
            "chunk max_len must be greater than zero".to_string(),
        ));
    }
    if overlap >= max_len {
        return Err(RagError::Config(format!(
            "chunk overlap ({}) must be smaller than max_len ({})",
            overlap, max_len
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    if chars.is_empty() {
        return Ok(chunks);
    }

    let mut start = 0;
    loop {
        let end = if chars.len() - start <= max_len {
            chars.len()
        } else {
            find_break(&chars, start, max_len, overlap)
        };

        chunks.push(Chunk {
            index: chunks.len(),
            start,
            end,
            text: chars[start..end].iter().collect(),
        });

        if end == chars.len() {
            break;
        }
        start = end - overlap;
    }

    debug!(
        "Split {} characters into {} chunks (max_len {}, overlap {})",
        chars.len(),
        chunks.len(),
        max_len,
        overlap
    );

    Ok(chunks)
}

/// Rebuild the original text from chunks produced with the given overlap
#[inline]
pub fn reassemble(chunks: &[Chunk], overlap: usize) -> String {
    let mut text = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            text.push_str(&chunk.text);
        } else {
            text.extend(chunk.text.chars().skip(overlap));
        }
    }
    text
}

/// Pick the end offset for a chunk starting at `start` when the remaining text
/// is longer than `max_len`.
fn find_break(chars: &[char], start: usize, max_len: usize, overlap: usize) -> usize {
    let hi = start + max_len;
    // A chunk must outgrow the overlap to make progress; half the window keeps
    // early boundaries from producing slivers.
    let lo = start + (overlap + 1).max(max_len / 2);

    for boundary in BOUNDARY_PREFERENCE {
        if let Some(end) = (lo..=hi).rev().find(|&end| is_break(chars, end, boundary)) {
            return end;
        }
    }

    hi
}

/// Whether cutting right before `chars[end]` lands on the given boundary
fn is_break(chars: &[char], end: usize, boundary: Boundary) -> bool {
    let Some(&last) = end.checked_sub(1).and_then(|i| chars.get(i)) else {
        return false;
    };
    let next = chars.get(end).copied();

    match boundary {
        Boundary::Paragraph => {
            last == '\n' && end >= 2 && chars.get(end - 2).is_some_and(|&c| c == '\n')
        }
        Boundary::Line => last == '\n',
        Boundary::Sentence => match last {
            '.' | '!' | '?' => next.is_none_or(char::is_whitespace),
            '。' | '！' | '？' => true,
            _ => false,
        },
        Boundary::Whitespace => last.is_whitespace(),
    }
}
