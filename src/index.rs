use crate::chunking::{estimate_token_count, split_documents, ChunkingPolicy, TextChunk};
use crate::document::Document;
use crate::embeddings::{cosine_similarity, Embedder, Embedding};
use crate::error::RagError;
use futures::stream::{self, StreamExt, TryStreamExt};
use log::{info, warn};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_INDEX_ID: AtomicU64 = AtomicU64::new(1);

/// A chunk stored together with its embedding
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk: TextChunk,
    pub embedding: Embedding,
}

/// A chunk returned by a similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk<'a> {
    /// Id of the index the chunk came from
    pub index_id: u64,
    pub chunk: &'a TextChunk,
    pub score: f32,
}

/// In-memory vector index searched by cosine similarity.
///
/// Entries are kept in document order, then chunk position. The index is
/// read-only once built.
#[derive(Debug)]
pub struct VectorIndex {
    id: u64,
    dims: usize,
    entries: Vec<IndexedChunk>,
}

impl VectorIndex {
    /// Build an index from chunk/embedding pairs.
    ///
    /// All embeddings must share one dimension.
    pub fn from_entries(entries: Vec<IndexedChunk>) -> Result<Self, RagError> {
        let dims = entries.first().map(|e| e.embedding.dims()).unwrap_or(0);

        if let Some(bad) = entries.iter().find(|e| e.embedding.dims() != dims) {
            return Err(RagError::IndexBuild(format!(
                "embedding for {} chunk {} has {} dimensions, expected {}",
                bad.chunk.source_path,
                bad.chunk.position,
                bad.embedding.dims(),
                dims
            )));
        }

        Ok(VectorIndex {
            id: NEXT_INDEX_ID.fetch_add(1, Ordering::Relaxed),
            dims,
            entries,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexedChunk] {
        &self.entries
    }

    /// Return the `limit` most similar chunks, best first.
    ///
    /// Equal scores keep index order, i.e. original document order.
    pub fn search(
        &self,
        query: &Embedding,
        limit: usize,
    ) -> Result<Vec<ScoredChunk<'_>>, RagError> {
        if self.entries.is_empty() {
            return Err(RagError::Retrieval("the index holds no chunks".into()));
        }
        if query.dims() != self.dims {
            return Err(RagError::Retrieval(format!(
                "query embedding has {} dimensions, index has {}",
                query.dims(),
                self.dims
            )));
        }

        let mut scored: Vec<ScoredChunk<'_>> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                index_id: self.id,
                chunk: &entry.chunk,
                score: cosine_similarity(&query.values, &entry.embedding.values),
            })
            .collect();

        // Stable sort keeps insertion order between equal scores
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);

        Ok(scored)
    }
}

/// Split, embed and index every document.
///
/// Up to `concurrency` embedding requests run at once; results are collected in
/// chunk order regardless of completion order. The first failure aborts the build
/// and nothing is kept. An invalid chunking policy is rejected before any
/// embedding request is made.
pub async fn build_index<E: Embedder>(
    documents: &[Document],
    embedder: &E,
    policy: &ChunkingPolicy,
    concurrency: usize,
) -> Result<VectorIndex, RagError> {
    policy.validate()?;

    let chunks = split_documents(documents, policy);
    let approx_tokens: usize = chunks.iter().map(|c| estimate_token_count(&c.text)).sum();
    info!(
        "Split {} documents into {} chunks (~{} tokens)",
        documents.len(),
        chunks.len(),
        approx_tokens
    );

    if chunks.is_empty() {
        warn!("No chunks to index; every question will fail retrieval");
    }

    let embeddings: Vec<Embedding> = stream::iter(chunks.iter())
        .map(move |chunk| async move {
            embedder.embed(&chunk.text).await.map_err(|e| {
                RagError::IndexBuild(format!(
                    "failed to embed {} chunk {}: {}",
                    chunk.source_path, chunk.position, e
                ))
            })
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    let entries = chunks
        .into_iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| IndexedChunk { chunk, embedding })
        .collect();

    let index = VectorIndex::from_entries(entries)?;
    info!(
        "Indexed {} chunks with {} ({} dimensions)",
        index.len(),
        embedder.model_name(),
        index.dims()
    );

    Ok(index)
}
