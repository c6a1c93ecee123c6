//! Fixed-size character chunker
//!
//! Splits document text into overlapping windows measured in characters (Unicode scalar
//! values). Boundaries depend only on the text and the two size parameters, so re-ingesting
//! the same document always yields the same spans and therefore the same chunk ids.

use crate::error::{ContractIqError, Result};

/// A character-range slice of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Zero-based position within the document
    pub chunk_index: usize,
    /// Inclusive start offset in characters
    pub start_char: usize,
    /// Exclusive end offset in characters
    pub end_char: usize,
    /// The text covered by `[start_char, end_char)`
    pub text: String,
}

/// Overlapping fixed-window chunker
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// Create a chunker, rejecting sizes that would not make forward progress
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ContractIqError::InvalidArgument(
                "chunk_size must be > 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(ContractIqError::InvalidArgument(format!(
                "chunk_overlap must be >= 0 and < chunk_size (got overlap {} for size {})",
                chunk_overlap, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Split `text` into windows of at most `chunk_size` characters.
    ///
    /// Adjacent windows share exactly `chunk_overlap` characters and the last window always
    /// ends at the end of the text. Empty text yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<ChunkSpan> {
        // Byte offset of every character boundary, including the end of the text
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect();
        let n = boundaries.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < n {
            let end = (start + self.chunk_size).min(n);
            chunks.push(ChunkSpan {
                chunk_index: chunks.len(),
                start_char: start,
                end_char: end,
                text: text[boundaries[start]..boundaries[end]].to_string(),
            });

            if end == n {
                break;
            }
            start = end - self.chunk_overlap;
        }

        chunks
    }
}
