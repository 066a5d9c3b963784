use crate::error::IngestError;
use crate::models::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, IngestError> {
        let config = Self {
            chunk_size,
            overlap,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings under which the window would never advance.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// Splits text into overlapping windows of `chunk_size` words.
#[derive(Debug, Clone, Copy)]
pub struct WordChunker {
    config: ChunkingConfig,
}

impl WordChunker {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Lazily yields chunk texts. Calling this again on the same text starts
    /// over from the first chunk.
    pub fn chunks<'a>(&self, text: &'a str) -> WordChunks<'a> {
        WordChunks {
            words: text.split_whitespace().collect(),
            chunk_size: self.config.chunk_size,
            stride: self.config.stride(),
            start: 0,
            finished: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WordChunks<'a> {
    words: Vec<&'a str>,
    chunk_size: usize,
    stride: usize,
    start: usize,
    finished: bool,
}

impl Iterator for WordChunks<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished && self.start < self.words.len() {
            let start = self.start;
            let end = (start + self.chunk_size).min(self.words.len());

            // The window that reaches the end absorbs the tail.
            if start + self.chunk_size >= self.words.len() {
                self.finished = true;
            } else {
                self.start += self.stride;
            }

            let chunk = self.words[start..end].join(" ");
            if !chunk.trim().is_empty() {
                return Some(chunk);
            }
        }

        None
    }
}
