//! Overlapping fixed-size text chunker.
//!
//! Splits the corpus into passages of at most `chunk_chars` characters for
//! embedding. Cut points prefer a paragraph break (`\n\n`) in the back half
//! of the window, then a sentence or line break, falling back to a hard cut.
//! Each chunk repeats the trailing `overlap_chars` characters of its
//! predecessor so a passage severed at a boundary still appears whole in at
//! least one chunk.

/// A contiguous slice of the corpus, the unit of semantic retrieval.
/// Immutable; the chunk set is rebuilt wholesale with the corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Position in original corpus order. Used as the ranking tie-break.
    pub index: usize,
    pub text: String,
}

/// Split `text` into chunks of at most `chunk_chars` characters with
/// `overlap_chars` characters of overlap. Sizes are in characters, not bytes.
pub fn chunk_corpus(text: &str, chunk_chars: usize, overlap_chars: usize) -> Vec<Chunk> {
    assert!(chunk_chars > 0, "chunk_chars must be > 0");
    assert!(
        overlap_chars < chunk_chars,
        "overlap_chars must be smaller than chunk_chars"
    );

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    // Byte offset of every char boundary, plus the end of the string.
    let bounds: Vec<usize> = trimmed
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(trimmed.len()))
        .collect();
    let total_chars = bounds.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize; // in chars

    while start < total_chars {
        let window_end = (start + chunk_chars).min(total_chars);
        let end = if window_end == total_chars {
            window_end
        } else {
            pick_cut(trimmed, &bounds, start, window_end)
        };

        let piece = trimmed[bounds[start]..bounds[end]].trim();
        if !piece.is_empty() {
            chunks.push(Chunk {
                index: chunks.len(),
                text: piece.to_string(),
            });
        }

        if end == total_chars {
            break;
        }
        // Step back for overlap, but always make forward progress.
        start = end.saturating_sub(overlap_chars).max(start + 1);
    }

    chunks
}

/// Choose a cut point in chars within `(start, window_end]`, preferring a
/// paragraph break, then a sentence end or newline, within the back half of
/// the window. Falls back to the hard limit.
fn pick_cut(text: &str, bounds: &[usize], start: usize, window_end: usize) -> usize {
    let window = &text[bounds[start]..bounds[window_end]];
    let half = (window_end - start) / 2;

    for pattern in ["\n\n", ". ", "\n"] {
        if let Some(byte_pos) = window.rfind(pattern) {
            let cut_byte = bounds[start] + byte_pos + pattern.len();
            // Map the byte offset back to a char offset.
            let cut = match bounds[start..=window_end].binary_search(&cut_byte) {
                Ok(i) => start + i,
                Err(_) => continue, // inside a multibyte char, not a real boundary
            };
            if cut > start + half {
                return cut;
            }
        }
    }
    window_end
}
