//! Deterministic character-window chunking.
//!
//! This module decides how extracted text is split for embedding:
//!
//! - Windows are counted in Unicode characters, not bytes or tokens. The
//!   dedup fingerprints in [`Chunk::fingerprint`] must be byte-for-byte
//!   stable across reruns, so the split may depend on nothing but the text
//!   and the configured `(size, overlap)` pair.
//! - Each full window re-reads the trailing `overlap` characters of its
//!   predecessor so spans around boundaries stay visible to retrieval.
//! - Once the remaining unseen text no longer fills a window, it is emitted
//!   as-is: the final chunk is the remainder and may be shorter than the
//!   window, with no leading overlap.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors raised while validating chunking parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// Window size of zero can never make progress.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must leave room for new characters in every window.
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge {
        /// Configured window size.
        size: usize,
        /// Rejected overlap value.
        overlap: usize,
    },
}

/// Validated `(size, overlap)` pair governing the split.
#[derive(Debug, Clone, Copy)]
pub struct ChunkPolicy {
    size: usize,
    overlap: usize,
}

/// One retrieval-sized window of a document's text.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Identifier of the owning remote file.
    pub file_id: String,
    /// Zero-based position within the document's chunk sequence.
    pub index: usize,
    /// Text span covered by this chunk.
    pub text: String,
    /// Number of Unicode characters in `text`.
    pub char_len: usize,
    /// Characters shared with the previous chunk's tail (zero for chunk 0
    /// and for a bare-remainder final chunk).
    pub overlap_with_previous: usize,
}

impl Chunk {
    /// Deterministic content fingerprint used as the vector store dedup key.
    ///
    /// Hashes the owning file id, the chunk index, and the text, separated by
    /// an unambiguous delimiter, so identical text at different positions or
    /// in different files never collides.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.file_id.as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.index.to_le_bytes());
        hasher.update([0x1f]);
        hasher.update(self.text.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl ChunkPolicy {
    /// Validate a `(size, overlap)` pair. Overlap not strictly smaller than
    /// the window is a configuration error, rejected here rather than at
    /// split time.
    pub fn new(size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        if size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        if overlap >= size {
            return Err(ChunkingError::OverlapTooLarge { size, overlap });
        }
        Ok(Self { size, overlap })
    }

    /// Configured window size in characters.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Configured overlap in characters.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into the chunk sequence for `file_id`.
    ///
    /// Whitespace-only input yields no chunks; the caller treats the owning
    /// file as having no ingestible content. Text no longer than the window
    /// yields exactly one chunk equal to the whole text. The same input and
    /// policy always produce the same sequence.
    pub fn split(&self, file_id: &str, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        // Byte offset of every character boundary, so windows slice on
        // character counts without re-scanning.
        let boundaries: Vec<usize> = text.char_indices().map(|(offset, _)| offset).collect();
        let total_chars = boundaries.len();
        let byte_at = |char_pos: usize| {
            if char_pos == total_chars {
                text.len()
            } else {
                boundaries[char_pos]
            }
        };

        let mut chunks = Vec::new();
        let mut seen = 0; // characters emitted so far, overlap excluded
        let mut index = 0;

        while seen < total_chars {
            let lead = if seen == 0 { 0 } else { self.overlap };
            let window_start = seen - lead;
            let window_end = window_start + self.size;

            let (start, end, overlap) = if window_end <= total_chars {
                (window_start, window_end, lead)
            } else {
                // Remainder no longer fills a window; emit it bare.
                (seen, total_chars, 0)
            };

            chunks.push(Chunk {
                file_id: file_id.to_string(),
                index,
                text: text[byte_at(start)..byte_at(end)].to_string(),
                char_len: end - start,
                overlap_with_previous: overlap,
            });

            index += 1;
            seen = end;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lengths(chunks: &[Chunk]) -> Vec<usize> {
        chunks.iter().map(|chunk| chunk.char_len).collect()
    }

    /// Rebuild the document by concatenating each chunk minus its overlap.
    fn reconstruct(chunks: &[Chunk]) -> String {
        let mut text = String::new();
        for chunk in chunks {
            let skip: usize = chunk
                .text
                .char_indices()
                .nth(chunk.overlap_with_previous)
                .map(|(offset, _)| offset)
                .unwrap_or(chunk.text.len());
            text.push_str(&chunk.text[skip..]);
        }
        text
    }

    #[test]
    fn twenty_five_hundred_chars_make_three_windows() {
        let policy = ChunkPolicy::new(1000, 200).expect("valid policy");
        let text = "a".repeat(2500);
        let chunks = policy.split("f1", &text);

        assert_eq!(lengths(&chunks), vec![1000, 1000, 700]);
        assert_eq!(chunks[0].overlap_with_previous, 0);
        assert_eq!(chunks[1].overlap_with_previous, 200);
        assert_eq!(chunks[2].overlap_with_previous, 0);
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn short_text_is_one_chunk() {
        let policy = ChunkPolicy::new(1000, 200).expect("valid policy");
        let chunks = policy.split("f1", "short document");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "short document");
        assert_eq!(chunks[0].overlap_with_previous, 0);
    }

    #[test]
    fn exact_window_multiple_has_no_stub_chunk() {
        let policy = ChunkPolicy::new(10, 2).expect("valid policy");
        // 10 + (10 - 2) = 18 characters fill exactly two windows.
        let text = "abcdefghijklmnopqr";
        let chunks = policy.split("f1", text);
        assert_eq!(lengths(&chunks), vec![10, 10]);
        assert_eq!(chunks[1].overlap_with_previous, 2);
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn empty_and_whitespace_yield_no_chunks() {
        let policy = ChunkPolicy::new(100, 10).expect("valid policy");
        assert!(policy.split("f1", "").is_empty());
        assert!(policy.split("f1", " \n\t  ").is_empty());
    }

    #[test]
    fn adjacent_chunks_share_the_configured_overlap() {
        let policy = ChunkPolicy::new(50, 10).expect("valid policy");
        let text: String = ('a'..='z').cycle().take(420).collect();
        let chunks = policy.split("f1", &text);

        for pair in chunks.windows(2) {
            let overlap = pair[1].overlap_with_previous;
            if overlap == 0 {
                continue; // bare remainder
            }
            let prev_tail: String = pair[0]
                .text
                .chars()
                .skip(pair[0].char_len - overlap)
                .collect();
            let next_head: String = pair[1].text.chars().take(overlap).collect();
            assert_eq!(prev_tail, next_head);
        }
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn multibyte_text_splits_on_character_boundaries() {
        let policy = ChunkPolicy::new(4, 1).expect("valid policy");
        let text = "αβγδεζηθικ";
        let chunks = policy.split("f1", text);
        let total: usize = chunks
            .iter()
            .map(|chunk| chunk.char_len - chunk.overlap_with_previous)
            .sum();
        assert_eq!(total, 10);
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn overlap_not_smaller_than_size_is_rejected() {
        assert_eq!(
            ChunkPolicy::new(100, 100).unwrap_err(),
            ChunkingError::OverlapTooLarge {
                size: 100,
                overlap: 100
            }
        );
        assert_eq!(
            ChunkPolicy::new(0, 0).unwrap_err(),
            ChunkingError::InvalidChunkSize
        );
    }

    #[test]
    fn identical_input_produces_identical_fingerprints() {
        let policy = ChunkPolicy::new(100, 20).expect("valid policy");
        let text = "the quick brown fox ".repeat(30);
        let first: Vec<String> = policy
            .split("f1", &text)
            .iter()
            .map(Chunk::fingerprint)
            .collect();
        let second: Vec<String> = policy
            .split("f1", &text)
            .iter()
            .map(Chunk::fingerprint)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn fingerprint_distinguishes_owner_index_and_text() {
        let base = Chunk {
            file_id: "f1".into(),
            index: 0,
            text: "same text".into(),
            char_len: 9,
            overlap_with_previous: 0,
        };
        let other_file = Chunk {
            file_id: "f2".into(),
            ..base.clone()
        };
        let other_index = Chunk {
            index: 1,
            ..base.clone()
        };
        assert_ne!(base.fingerprint(), other_file.fingerprint());
        assert_ne!(base.fingerprint(), other_index.fingerprint());
    }
}
