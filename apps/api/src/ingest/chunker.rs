//! Sentence-aware text chunking with overlap.

use unicode_segmentation::UnicodeSegmentation;

use crate::ingest::Document;

/// Target chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// A chunk of document text ready to be embedded.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub page: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl TextChunker {
    /// `overlap` is clamped below `chunk_size` so every chunk makes progress.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size / 2),
        }
    }

    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents
            .iter()
            .flat_map(|doc| {
                self.chunk_text(&doc.text).into_iter().map(|text| Chunk {
                    text,
                    page: doc.page,
                })
            })
            .collect()
    }

    /// Packs whole sentences into chunks of about `chunk_size` bytes. A sentence
    /// longer than that becomes its own chunk. Each new chunk starts with the tail
    /// of the previous one, up to `overlap` bytes, cut at a word boundary.
    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        // Length of the carried-over prefix; a chunk that is only overlap adds nothing
        let mut carried = 0usize;

        for sentence in text.split_sentence_bounds() {
            if current.len() > carried && current.len() + sentence.len() > self.chunk_size {
                push_trimmed(&mut chunks, &current);
                current = self.overlap_tail(&current);
                carried = current.len();
            }
            current.push_str(sentence);
        }

        if current.len() > carried {
            push_trimmed(&mut chunks, &current);
        }
        chunks
    }

    fn overlap_tail(&self, text: &str) -> String {
        if self.overlap == 0 {
            return String::new();
        }
        if text.len() <= self.overlap {
            return text.to_string();
        }

        let mut start = text.len() - self.overlap;
        while start > 0 && !text.is_char_boundary(start) {
            start -= 1;
        }
        let tail = &text[start..];

        match tail.find(char::is_whitespace) {
            Some(pos) => tail[pos..].trim_start().to_string(),
            None => tail.to_string(),
        }
    }
}

fn push_trimmed(chunks: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}
