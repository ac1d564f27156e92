use crate::config::Config;
use crate::error::RagError;
use crate::ollama::OllamaClient;
use log::info;
use serde::{Deserialize, Serialize};

/// Representation of a vector embedding
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn dims(&self) -> usize {
        self.values.len()
    }
}

/// Turns text into fixed-length vectors.
///
/// Implementations must be deterministic: the same text embeds to the same vector
/// for a given model.
#[allow(async_fn_in_trait)]
pub trait Embedder {
    /// Model identifier
    fn model_name(&self) -> &str;

    /// Generate the embedding for a text
    async fn embed(&self, text: &str) -> Result<Embedding, RagError>;
}

/// Embedding adapter backed by an Ollama embedding model
pub struct OllamaEmbedder {
    client: OllamaClient,
    model: String,
    dims: usize,
}

impl OllamaEmbedder {
    /// Configure the embedding model and check it with one request.
    ///
    /// Fails with [`RagError::EmbeddingSetup`] when the server cannot be reached or
    /// rejects the model.
    pub async fn connect(client: OllamaClient, config: &Config) -> Result<Self, RagError> {
        let model = config.embedding_model.clone();

        let sample = client
            .embed(&model, &["embedding model check"])
            .await
            .map_err(|e| RagError::EmbeddingSetup(format!("{}: {:#}", model, e)))?;

        let dims = sample.first().map(Vec::len).unwrap_or(0);
        if dims == 0 {
            return Err(RagError::EmbeddingSetup(format!(
                "{} returned an empty embedding",
                model
            )));
        }

        info!("Embedding model {} ready ({} dimensions)", model, dims);

        Ok(OllamaEmbedder {
            client,
            model,
            dims,
        })
    }

    /// Vector dimension reported by the model at setup
    pub fn dims(&self) -> usize {
        self.dims
    }
}

impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Embedding, RagError> {
        let mut embeddings = self
            .client
            .embed(&self.model, &[text])
            .await
            .map_err(|e| RagError::Retrieval(format!("embedding request failed: {:#}", e)))?;

        let values = embeddings.pop().unwrap_or_default();
        if values.len() != self.dims {
            return Err(RagError::Retrieval(format!(
                "expected a {}-dimensional embedding, got {}",
                self.dims,
                values.len()
            )));
        }

        Ok(Embedding { values })
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors, vectors of different lengths and zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
