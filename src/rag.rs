use crate::embeddings::Embedder;
use crate::error::RagError;
use crate::index::{ScoredChunk, VectorIndex};
use crate::llm::{LanguageModel, TokenStream};
use log::{debug, info};

/// RAG (Retrieval-Augmented Generation) query engine.
///
/// Binds a built index to the embedder it was built with and a language model.
pub struct QueryEngine<E, L> {
    index: VectorIndex,
    embedder: E,
    llm: L,
    top_k: usize,
}

impl<E: Embedder, L: LanguageModel> QueryEngine<E, L> {
    /// Create a new query engine
    pub fn new(index: VectorIndex, embedder: E, llm: L, top_k: usize) -> Self {
        QueryEngine {
            index,
            embedder,
            llm,
            top_k,
        }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve the `top_k` chunks most similar to the question
    pub async fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk<'_>>, RagError> {
        if self.index.is_empty() {
            return Err(RagError::Retrieval("the index holds no chunks".into()));
        }

        // Get embedding for the question
        let question_embedding = self.embedder.embed(question).await.map_err(|e| match e {
            RagError::Retrieval(_) => e,
            other => RagError::Retrieval(other.to_string()),
        })?;

        let chunks = self.index.search(&question_embedding, self.top_k)?;
        debug!(
            "Retrieved {} chunks: {:?}",
            chunks.len(),
            chunks
                .iter()
                .map(|c| format!("{}#{} ({:.3})", c.chunk.source_path, c.chunk.position, c.score))
                .collect::<Vec<_>>()
        );

        Ok(chunks)
    }

    /// Answer a question with a stream of tokens grounded in the retrieved chunks
    pub async fn answer(&self, question: &str) -> Result<TokenStream, RagError> {
        let chunks = self.retrieve(question).await?;
        info!("Answering with {} context chunks", chunks.len());

        let prompt = build_prompt(self.llm.system_prompt(), &chunks, question);
        self.llm.generate(&prompt).await
    }
}

/// Assemble the prompt: system prompt, retrieved context in rank order, then the question
pub fn build_prompt(system_prompt: &str, chunks: &[ScoredChunk<'_>], question: &str) -> String {
    let context = chunks
        .iter()
        .map(|c| format!("file_path: {}\n\n{}", c.chunk.source_path, c.chunk.text))
        .collect::<Vec<String>>()
        .join("\n\n");

    format!(
        "{}\n\nContext information is below.\n---------------------\n{}\n---------------------\nGiven the context information and not prior knowledge, answer the query.\nQuery: {}\nAnswer: ",
        system_prompt.trim(),
        context,
        question
    )
}
