use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Thin HTTP client for the Ollama REST API
#[derive(Clone)]
pub struct OllamaClient {
    endpoint: String,
    client: reqwest::Client,
    /// No overall timeout: a generation may legitimately take minutes
    stream_client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let stream_client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(OllamaClient {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
            stream_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Names of the models the server has pulled
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.endpoint);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Ollama is not reachable at {}", self.endpoint))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "API request failed: {} {}",
                status,
                error_text
            ));
        }

        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Generate embeddings for a batch of texts
    pub async fn embed(&self, model: &str, input: &[&str]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.endpoint);
        let request = EmbedRequest { model, input };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Ollama is not reachable at {}", self.endpoint))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "API request failed: {} {}",
                status,
                error_text
            ));
        }

        let response_data: EmbedResponse = response.json().await?;

        if response_data.embeddings.len() != input.len() {
            return Err(anyhow::anyhow!(
                "Expected {} embeddings, got {}",
                input.len(),
                response_data.embeddings.len()
            ));
        }

        Ok(response_data.embeddings)
    }

    /// Start a streaming generation; the body is newline-delimited JSON
    pub async fn generate_stream(&self, model: &str, prompt: &str) -> Result<reqwest::Response> {
        let url = format!("{}/api/generate", self.endpoint);
        let request = GenerateRequest {
            model,
            prompt,
            stream: true,
        };

        let response = self
            .stream_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Ollama is not reachable at {}", self.endpoint))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "API request failed: {} {}",
                status,
                error_text
            ));
        }

        Ok(response)
    }
}

/// One line of a streaming `/api/generate` response
#[derive(Deserialize, Debug, Default, PartialEq)]
pub struct GenerateChunk {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Parse a single NDJSON line of a generation stream
pub fn parse_generate_line(line: &[u8]) -> Result<GenerateChunk> {
    serde_json::from_slice(line).context("Malformed generation chunk")
}

/// Whether `wanted` names one of the `available` models.
/// An untagged name matches the `:latest` tag.
pub fn model_is_available(available: &[String], wanted: &str) -> bool {
    available.iter().any(|name| {
        name == wanted || (!wanted.contains(':') && name == &format!("{}:latest", wanted))
    })
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize, Debug)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize, Debug)]
struct TagsResponse {
    models: Vec<ModelTag>,
}

#[derive(Deserialize, Debug)]
struct ModelTag {
    name: String,
}
