use crate::document::Document;
use crate::error::RagError;

/// Represents a text chunk with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// The actual text content of this chunk
    pub text: String,
    /// Index of the parent document in the loaded document sequence
    pub document_index: usize,
    /// Source path of the parent document
    pub source_path: String,
    /// Ordinal of this chunk within its document
    pub position: usize,
    /// Byte offset of this chunk in the original document
    pub start_offset: usize,
}

/// Fixed-size, overlapping token windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingPolicy {
    /// Tokens per window
    pub chunk_size: usize,
    /// Tokens repeated at the start of the next window
    pub chunk_overlap: usize,
}

impl Default for ChunkingPolicy {
    fn default() -> Self {
        ChunkingPolicy {
            chunk_size: 512,
            chunk_overlap: 50,
        }
    }
}

impl ChunkingPolicy {
    pub fn validate(&self) -> Result<(), RagError> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be at least 1".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    fn stride(&self) -> usize {
        self.chunk_size.saturating_sub(self.chunk_overlap).max(1)
    }
}

/// Split a document into windows of `chunk_size` tokens.
///
/// A token is a run of non-whitespace characters. Each chunk is the verbatim slice
/// of the document between the first and last token of its window, so indentation
/// and line breaks inside a chunk are preserved. A zero `chunk_size` yields no chunks.
pub fn split_into_chunks(
    document: &Document,
    document_index: usize,
    policy: &ChunkingPolicy,
) -> Vec<TextChunk> {
    let text = document.text.as_str();
    let spans = token_spans(text);
    if spans.is_empty() || policy.chunk_size == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + policy.chunk_size).min(spans.len());
        let start_offset = spans[start].0;
        let end_offset = spans[end - 1].1;

        chunks.push(TextChunk {
            text: text[start_offset..end_offset].to_string(),
            document_index,
            source_path: document.source_path.clone(),
            position: chunks.len(),
            start_offset,
        });

        if end == spans.len() {
            break;
        }
        start += policy.stride();
    }

    chunks
}

/// Split every document, keeping document order then chunk position
pub fn split_documents(documents: &[Document], policy: &ChunkingPolicy) -> Vec<TextChunk> {
    documents
        .iter()
        .enumerate()
        .flat_map(|(index, document)| split_into_chunks(document, index, policy))
        .collect()
}

/// Byte ranges of whitespace-delimited tokens
fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut token_start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(start) = token_start.take() {
                spans.push((start, i));
            }
        } else if token_start.is_none() {
            token_start = Some(i);
        }
    }
    if let Some(start) = token_start {
        spans.push((start, text.len()));
    }

    spans
}

/// Calculate approximate token count for a text
/// This is a very simple estimation - words plus punctuation
pub fn estimate_token_count(text: &str) -> usize {
    let words = text.split_whitespace().count();
    let punctuation = text.chars().filter(|c| c.is_ascii_punctuation()).count();
    words + punctuation
}
