//! Chunking utilities for splitting documents into overlapping segments.
//!
//! Documents are cut into fixed windows of at most `chunk_size` characters,
//! each starting `chunk_size - overlap` characters after the previous one,
//! so consecutive segments share exactly `overlap` characters. Only the
//! final window may be shorter.

use crate::{
    document::{Segment, SegmentMetadata},
    error::{Error, Result},
};

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Prefix added to uploaded files by the upload layer; not part of the name.
const TEMP_PREFIX: &str = "temp_";

/// Chunking configuration.
///
/// # Examples
///
/// ```
/// use medrag::chunking::{ChunkingConfig, DEFAULT_CHUNK_SIZE};
///
/// let config = ChunkingConfig::default();
/// assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
/// assert!(ChunkingConfig::new(100, 100).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters.
    pub overlap: usize,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(Error::Config(format!(
                "chunk overlap ({overlap}) must be smaller than chunk size \
                 ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// A chunk of text from a larger document.
///
/// Produced by [`chunk_text`]. Each chunk represents a window of the
/// original text, with an index and byte offset for mapping back.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// The chunk text content.
    pub text: String,
    /// Zero-based chunk index within the document.
    pub index: usize,
    /// Byte offset where this chunk starts in the original document.
    pub start_offset: usize,
}

/// Split text into overlapping chunks.
///
/// Lengths are counted in characters, so multi-byte UTF-8 sequences are
/// never split. Whitespace-only text yields no chunks.
///
/// # Examples
///
/// ```
/// use medrag::chunking::{ChunkingConfig, chunk_text};
///
/// let chunks = chunk_text("Hello, world!", ChunkingConfig::default());
/// assert_eq!(chunks.len(), 1);
///
/// let text = "a".repeat(2500);
/// let chunks = chunk_text(&text, ChunkingConfig::default());
/// assert_eq!(chunks.len(), 3);
/// ```
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let char_count = text.chars().count();
    if char_count <= config.chunk_size {
        return vec![Chunk {
            text: text.to_string(),
            index: 0,
            start_offset: 0,
        }];
    }

    // char index -> byte index, with one past the end
    let char_to_byte: Vec<usize> = text
        .char_indices()
        .map(|(byte_idx, _)| byte_idx)
        .chain(std::iter::once(text.len()))
        .collect();

    let mut chunks = Vec::new();
    let mut start_char = 0;

    loop {
        let end_char = (start_char + config.chunk_size).min(char_count);
        let start_byte = char_to_byte[start_char];
        let end_byte = char_to_byte[end_char];

        chunks.push(Chunk {
            text: text[start_byte..end_byte].to_string(),
            index: chunks.len(),
            start_offset: start_byte,
        });

        if end_char == char_count {
            break;
        }
        start_char += config.step();
    }

    chunks
}

/// Strip the upload layer's `temp_` prefix from a file name.
pub fn source_name(file_name: &str) -> &str {
    file_name.strip_prefix(TEMP_PREFIX).unwrap_or(file_name)
}

/// Estimate the page a chunk came from by spreading chunks evenly over the
/// document's pages.
///
/// This is a heuristic: chunk `i` of `n` maps to
/// `floor(i * total_pages / n) + 1`, capped at `total_pages`.
///
/// # Examples
///
/// ```
/// use medrag::chunking::estimate_page;
///
/// assert_eq!(estimate_page(0, 4, 2), 1);
/// assert_eq!(estimate_page(2, 4, 2), 2);
/// assert_eq!(estimate_page(3, 4, 2), 2);
/// ```
pub fn estimate_page(index: usize, total_chunks: usize, total_pages: u32) -> u32 {
    let total_pages = total_pages.max(1);
    if total_chunks == 0 {
        return 1;
    }
    let estimated = (index as u64 * u64::from(total_pages))
        / total_chunks as u64
        + 1;
    estimated.min(u64::from(total_pages)) as u32
}

/// Attach provenance metadata to each chunk of one document.
pub fn tag_segments(
    chunks: Vec<Chunk>,
    file_name: &str,
    total_pages: u32,
) -> Vec<Segment> {
    let total = chunks.len();
    let source = source_name(file_name).to_string();

    chunks
        .into_iter()
        .map(|chunk| Segment {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: SegmentMetadata {
                source: source.clone(),
                page: estimate_page(chunk.index, total, total_pages),
                split: format!("{} of {}", chunk.index + 1, total),
            },
            text: chunk.text,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn char_len(s: &str) -> usize {
        s.chars().count()
    }

    #[test]
    fn short_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", ChunkingConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].start_offset, 0);
    }

    #[test]
    fn blank_text_has_no_chunks() {
        assert!(chunk_text("", ChunkingConfig::default()).is_empty());
        assert!(chunk_text(" \n\t ", ChunkingConfig::default()).is_empty());
    }

    #[test]
    fn exact_chunk_size_is_single_chunk() {
        let text = "x".repeat(DEFAULT_CHUNK_SIZE);
        assert_eq!(chunk_text(&text, ChunkingConfig::default()).len(), 1);
    }

    #[test]
    fn twenty_five_hundred_chars_gives_three_chunks() {
        let text: String = (0..2500)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect();
        let chunks = chunk_text(&text, ChunkingConfig::default());

        assert_eq!(chunks.len(), 3);
        let lens: Vec<usize> = chunks.iter().map(|c| char_len(&c.text)).collect();
        assert_eq!(lens, vec![1000, 1000, 900]);
        assert_eq!(chunks[1].start_offset, 800);
        assert_eq!(chunks[2].start_offset, 1600);
        assert!(chunks[0].text.ends_with(&chunks[1].text[..200]));
        assert!(chunks[1].text.ends_with(&chunks[2].text[..200]));
    }

    #[test]
    fn handles_multibyte_chars() {
        let text = "café ☕ naïve 日本語 🎉 ".repeat(100);
        let config = ChunkingConfig::new(100, 20).unwrap();
        let chunks = chunk_text(&text, config);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(char_len(&chunk.text) <= 100);
        }
    }

    #[test]
    fn config_rejects_overlap_not_smaller_than_size() {
        assert!(ChunkingConfig::new(200, 200).is_err());
        assert!(ChunkingConfig::new(0, 0).is_err());
        assert!(ChunkingConfig::new(200, 199).is_ok());
    }

    #[test]
    fn source_name_strips_temp_prefix() {
        assert_eq!(source_name("temp_diabetes.pdf"), "diabetes.pdf");
        assert_eq!(source_name("diabetes.pdf"), "diabetes.pdf");
        assert_eq!(source_name("my_temp_notes.md"), "my_temp_notes.md");
    }

    #[test]
    fn estimate_page_spreads_and_caps() {
        assert_eq!(estimate_page(0, 3, 1), 1);
        assert_eq!(estimate_page(2, 3, 1), 1);
        assert_eq!(estimate_page(0, 10, 5), 1);
        assert_eq!(estimate_page(9, 10, 5), 5);
        assert_eq!(estimate_page(0, 2, 10), 1);
        assert_eq!(estimate_page(1, 2, 10), 6);
        assert_eq!(estimate_page(5, 3, 2), 2);
        assert_eq!(estimate_page(0, 0, 3), 1);
    }

    #[test]
    fn tag_segments_assigns_splits() {
        let text = "y".repeat(2500);
        let chunks = chunk_text(&text, ChunkingConfig::default());
        let segments = tag_segments(chunks, "temp_report.txt", 1);

        let splits: Vec<&str> =
            segments.iter().map(|s| s.metadata.split.as_str()).collect();
        assert_eq!(splits, vec!["1 of 3", "2 of 3", "3 of 3"]);
        assert!(segments.iter().all(|s| s.metadata.source == "report.txt"));
        assert!(segments.iter().all(|s| s.metadata.page == 1));

        let mut ids: Vec<&str> = segments.iter().map(|s| s.id.as_str()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    proptest! {
        #[test]
        fn chunks_bounded_and_overlap_exactly(
            text in "[a-z ]{1,3000}",
            chunk_size in 10usize..400,
            overlap_ratio in 0.0f64..0.9,
        ) {
            let overlap = ((chunk_size as f64) * overlap_ratio) as usize;
            let config = ChunkingConfig::new(chunk_size, overlap).unwrap();
            let chunks = chunk_text(&text, config);

            for chunk in &chunks {
                prop_assert!(char_len(&chunk.text) <= chunk_size);
            }
            for pair in chunks.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                prop_assert_eq!(char_len(&a.text), chunk_size);
                prop_assert_eq!(b.start_offset, a.start_offset + chunk_size - overlap);
                let shared: String = b.text.chars().take(overlap).collect();
                prop_assert!(a.text.ends_with(&shared));
            }
            if let Some(last) = chunks.last() {
                prop_assert_eq!(last.start_offset + last.text.len(), text.len());
            }
        }
    }
}
