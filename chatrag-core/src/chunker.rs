//! Overlapping text chunker.
//!
//! Splits text into windows of at most `chunk_size` characters. Each window
//! begins exactly `chunk_overlap` characters before the previous one ended,
//! so stripping the overlap from every chunk but the first and concatenating
//! gives back the original text. Window ends snap to the last paragraph,
//! line, sentence or word boundary in the upper half of the window, and fall
//! back to a hard cut when none exists.

use thiserror::Error;

use crate::config::ChunkingConfig;

/// Boundaries tried in order of preference. A match ends the chunk right
/// after the separator.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", " "];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("Invalid chunking config: chunk_size={chunk_size}, chunk_overlap={chunk_overlap}")]
    InvalidConfig {
        chunk_size: usize,
        chunk_overlap: usize,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(ChunkingError::InvalidConfig {
                chunk_size,
                chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self, ChunkingError> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into overlapping chunks. Empty text yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        // Byte offset of every char, plus the end of the string.
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let len = offsets.len() - 1;

        if len == 0 {
            return Vec::new();
        }
        if len <= self.chunk_size {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let limit = start + self.chunk_size;
            if limit >= len {
                chunks.push(text[offsets[start]..].to_string());
                break;
            }

            let end = self.snap_end(text, &offsets, start, limit);
            chunks.push(text[offsets[start]..offsets[end]].to_string());
            start = end - self.chunk_overlap;
        }

        chunks
    }

    /// Pick the window end (exclusive, in chars) for a window starting at
    /// `start` whose hard limit is `limit`.
    fn snap_end(&self, text: &str, offsets: &[usize], start: usize, limit: usize) -> usize {
        // Never end at or before start + overlap, or the next window would not advance.
        let floor = (start + self.chunk_size / 2).max(start + self.chunk_overlap + 1);
        let window = &text[offsets[floor]..offsets[limit]];

        for separator in SEPARATORS {
            if let Some(pos) = window.rfind(separator) {
                let byte_end = offsets[floor] + pos + separator.len();
                // Separators are ASCII, so byte_end always lands on a char boundary.
                if let Ok(end) = offsets.binary_search(&byte_end) {
                    return end;
                }
            }
        }

        limit
    }
}
