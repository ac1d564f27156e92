use crate::config::Config;
use crate::document::load_documents;
use crate::embeddings::{Embedder, OllamaEmbedder};
use crate::error::RagError;
use crate::index::build_index;
use crate::llm::{LanguageModel, OllamaLlm};
use crate::ollama::OllamaClient;
use crate::rag::QueryEngine;
use crate::session::SessionState;
use log::{debug, info, warn};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

/// Constructs the model adapters used by the pipeline
#[allow(async_fn_in_trait)]
pub trait ModelBackend {
    type Embedder: Embedder;
    type Llm: LanguageModel;

    /// Configure the language model; fails with [`RagError::LlmSetup`]
    async fn connect_llm(&self, config: &Config) -> Result<Self::Llm, RagError>;

    /// Configure the embedding model; fails with [`RagError::EmbeddingSetup`]
    async fn connect_embedder(&self, config: &Config) -> Result<Self::Embedder, RagError>;
}

/// Adapters backed by a local Ollama server
pub struct OllamaBackend {
    client: OllamaClient,
}

impl OllamaBackend {
    pub fn new(config: &Config) -> Result<Self, RagError> {
        let client = OllamaClient::new(
            config.endpoint(),
            Duration::from_secs(config.request_timeout_secs),
        )
        .map_err(|e| RagError::LlmSetup(format!("{:#}", e)))?;

        Ok(OllamaBackend { client })
    }
}

impl ModelBackend for OllamaBackend {
    type Embedder = OllamaEmbedder;
    type Llm = OllamaLlm;

    async fn connect_llm(&self, config: &Config) -> Result<OllamaLlm, RagError> {
        OllamaLlm::connect(self.client.clone(), config).await
    }

    async fn connect_embedder(&self, config: &Config) -> Result<OllamaEmbedder, RagError> {
        OllamaEmbedder::connect(self.client.clone(), config).await
    }
}

/// What a pipeline run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub documents: usize,
    pub chunks: usize,
    /// Documents came from the session instead of the data directory
    pub reused_documents: bool,
    /// The data directory was removed
    pub cleaned_up: bool,
}

/// Run setup in order: language model, embedding model, documents, index, cleanup.
///
/// Any error before cleanup is fatal and returned as-is. Cleanup failures are only
/// logged, since the query engine is already built from memory by then.
pub async fn run_pipeline<B: ModelBackend>(
    config: &Config,
    session: &mut SessionState<B::Embedder, B::Llm>,
    backend: &B,
    data_dir: &Path,
) -> Result<PipelineReport, RagError> {
    // Language model
    let llm = backend.connect_llm(config).await?;
    debug!("Using language model {}", llm.model_name());

    // Embedding model
    let embedder = backend.connect_embedder(config).await?;
    debug!("Using embedding model {}", embedder.model_name());

    // Documents
    let reused_documents = session.has_documents();
    if reused_documents {
        info!("Documents are already available; skipping document loading");
    } else {
        let documents = load_documents(data_dir)?;
        session.set_documents(documents);
        info!("Data Processed");
    }

    // Index and query engine
    let documents = session.documents().unwrap_or_default();
    let document_count = documents.len();
    let index = build_index(
        documents,
        &embedder,
        &config.chunking_policy(),
        config.embed_concurrency,
    )
    .await?;
    let chunks = index.len();

    session.set_query_engine(QueryEngine::new(index, embedder, llm, config.top_k));
    info!("Created File Index");

    // Scratch files
    let cleaned_up = match remove_scratch_dir(data_dir) {
        Ok(removed) => {
            if removed {
                info!("Removed Temp Files");
            }
            removed
        }
        Err(e) => {
            warn!("{}", e);
            false
        }
    };

    Ok(PipelineReport {
        documents: document_count,
        chunks,
        reused_documents,
        cleaned_up,
    })
}

/// Delete the scratch directory. Returns `Ok(false)` when it was already gone.
pub fn remove_scratch_dir(dir: &Path) -> Result<bool, RagError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Nothing to clean up at {}", dir.display());
            Ok(false)
        }
        Err(e) => Err(RagError::Cleanup(format!("{}: {}", dir.display(), e))),
    }
}
