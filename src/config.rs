use crate::chunking::ChunkingPolicy;
use crate::error::RagError;
use log::debug;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Application configuration, read once at startup
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Config {
    /// Generative model served by Ollama
    pub selected_model: String,
    /// Base URL of the Ollama server
    pub ollama_endpoint: String,
    /// System prompt placed at the top of every assembled prompt
    pub system_prompt: String,
    /// Embedding model served by Ollama
    pub embedding_model: String,
    /// Window size in tokens
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Tokens shared by consecutive windows
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per question
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Embedding requests kept in flight while building the index
    #[serde(default = "default_embed_concurrency")]
    pub embed_concurrency: usize,
    /// Timeout for non-streaming Ollama requests
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_chunk_size() -> usize {
    512
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_top_k() -> usize {
    3
}

fn default_embed_concurrency() -> usize {
    4
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Config {
    /// Load configuration from a YAML file, apply environment overrides and validate
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RagError> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());

        let content = fs::read_to_string(path).map_err(|e| {
            RagError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML text without validating it
    pub fn from_yaml(content: &str) -> Result<Self, RagError> {
        serde_yaml::from_str(content).map_err(|e| RagError::Config(e.to_string()))
    }

    /// Override model and endpoint settings from `REPO_CHAT_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        if let Ok(model) = env::var("REPO_CHAT_SELECTED_MODEL") {
            self.selected_model = model;
        }
        if let Ok(endpoint) = env::var("REPO_CHAT_OLLAMA_ENDPOINT") {
            self.ollama_endpoint = endpoint;
        }
        if let Ok(model) = env::var("REPO_CHAT_EMBEDDING_MODEL") {
            self.embedding_model = model;
        }
    }

    pub fn validate(&self) -> Result<(), RagError> {
        if self.selected_model.trim().is_empty() {
            return Err(RagError::Config("selected_model must not be empty".into()));
        }
        if self.embedding_model.trim().is_empty() {
            return Err(RagError::Config("embedding_model must not be empty".into()));
        }

        let url = reqwest::Url::parse(&self.ollama_endpoint).map_err(|e| {
            RagError::Config(format!(
                "ollama_endpoint '{}' is not a valid URL: {}",
                self.ollama_endpoint, e
            ))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(RagError::Config(format!(
                "ollama_endpoint must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be at least 1".into()));
        }
        if self.embed_concurrency == 0 {
            return Err(RagError::Config("embed_concurrency must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(RagError::Config("request_timeout_secs must be at least 1".into()));
        }
        self.chunking_policy().validate()
    }

    pub fn chunking_policy(&self) -> ChunkingPolicy {
        ChunkingPolicy {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }

    /// Endpoint without a trailing slash, ready to have API paths appended
    pub fn endpoint(&self) -> &str {
        self.ollama_endpoint.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
selected_model: "llama3"
ollama_endpoint: "http://localhost:11434"
system_prompt: "You are a helpful assistant for a code repository."
embedding_model: "nomic-embed-text"
"#;

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.selected_model, "llama3");
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.embed_concurrency, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", MINIMAL).unwrap();
        writeln!(file, "top_k: 5").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.top_k, 5);
        assert_eq!(config.system_prompt, "You are a helpful assistant for a code repository.");
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("non/existent/config.yaml").unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn test_missing_required_key() {
        let err = Config::from_yaml("selected_model: llama3\n").unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn test_invalid_endpoint() {
        let mut config = Config::from_yaml(MINIMAL).unwrap();
        config.ollama_endpoint = "not a url".into();
        assert!(config.validate().is_err());

        config.ollama_endpoint = "ftp://localhost".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_chunking() {
        let mut config = Config::from_yaml(MINIMAL).unwrap();
        config.chunk_overlap = config.chunk_size;
        assert!(config.validate().is_err());

        let mut config = Config::from_yaml(MINIMAL).unwrap();
        config.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_request_timeout_rejected() {
        let mut config = Config::from_yaml(MINIMAL).unwrap();
        config.request_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
        assert!(err.to_string().contains("request_timeout_secs"));
    }

    #[test]
    fn test_endpoint_trailing_slash() {
        let mut config = Config::from_yaml(MINIMAL).unwrap();
        config.ollama_endpoint = "http://localhost:11434/".into();
        assert_eq!(config.endpoint(), "http://localhost:11434");
    }
}
