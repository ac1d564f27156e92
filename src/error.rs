use thiserror::Error;

/// How a failure affects the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Aborts the whole run with a nonzero exit status
    Fatal,
    /// Fails the current chat turn; the loop keeps going
    TurnRecoverable,
    /// Logged and otherwise ignored
    Warning,
}

/// Errors raised anywhere in the ingest-index-query pipeline
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to acquire repository {repo}: {reason}")]
    RepositoryAcquisition { repo: String, reason: String },

    #[error("Document Load Error: {0}")]
    DocumentLoad(String),

    #[error("Setting up Embedding Model failed: {0}")]
    EmbeddingSetup(String),

    #[error("Failed to setup LLM: {0}")]
    LlmSetup(String),

    #[error("Index Creation Error: {0}")]
    IndexBuild(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Unable to delete data files, you may want to clean-up manually: {0}")]
    Cleanup(String),
}

impl RagError {
    /// Severity of this error kind
    pub fn severity(&self) -> Severity {
        match self {
            RagError::Config(_)
            | RagError::RepositoryAcquisition { .. }
            | RagError::DocumentLoad(_)
            | RagError::EmbeddingSetup(_)
            | RagError::LlmSetup(_)
            | RagError::IndexBuild(_) => Severity::Fatal,
            RagError::Retrieval(_) | RagError::Generation(_) => Severity::TurnRecoverable,
            RagError::Cleanup(_) => Severity::Warning,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}
