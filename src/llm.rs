use crate::config::Config;
use crate::error::RagError;
use crate::ollama::{model_is_available, parse_generate_line, OllamaClient};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Incrementally produced answer tokens.
///
/// The stream ends when the channel closes. A failure arrives as a single
/// `Err` item, after which no more tokens follow.
pub type TokenStream = ReceiverStream<Result<String, RagError>>;

const TOKEN_CHANNEL_CAPACITY: usize = 64;

/// A generative model configured with a fixed system prompt
#[allow(async_fn_in_trait)]
pub trait LanguageModel {
    fn model_name(&self) -> &str;

    fn system_prompt(&self) -> &str;

    /// Start generating a completion for `prompt`
    async fn generate(&self, prompt: &str) -> Result<TokenStream, RagError>;
}

/// Language model adapter backed by an Ollama generative model
pub struct OllamaLlm {
    client: OllamaClient,
    model: String,
    system_prompt: String,
}

impl OllamaLlm {
    /// Configure the language model.
    ///
    /// Checks that the endpoint answers and that the model has been pulled;
    /// otherwise fails with [`RagError::LlmSetup`].
    pub async fn connect(client: OllamaClient, config: &Config) -> Result<Self, RagError> {
        let models = client
            .list_models()
            .await
            .map_err(|e| RagError::LlmSetup(format!("{:#}", e)))?;

        if !model_is_available(&models, &config.selected_model) {
            return Err(RagError::LlmSetup(format!(
                "model '{}' is not available at {} (available: {})",
                config.selected_model,
                client.endpoint(),
                models.join(", ")
            )));
        }

        info!(
            "Language model {} ready at {}",
            config.selected_model,
            client.endpoint()
        );

        Ok(OllamaLlm {
            client,
            model: config.selected_model.clone(),
            system_prompt: config.system_prompt.clone(),
        })
    }
}

impl LanguageModel for OllamaLlm {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    async fn generate(&self, prompt: &str) -> Result<TokenStream, RagError> {
        let mut response = self
            .client
            .generate_stream(&self.model, prompt)
            .await
            .map_err(|e| RagError::Generation(format!("{:#}", e)))?;

        let (tx, rx) = mpsc::channel(TOKEN_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut buffer: Vec<u8> = Vec::new();

            loop {
                match response.chunk().await {
                    Ok(Some(bytes)) => {
                        buffer.extend_from_slice(&bytes);
                        while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
                            let line: Vec<u8> = buffer.drain(..=newline).collect();
                            match forward_line(&line, &tx).await {
                                LineOutcome::Continue => {}
                                LineOutcome::Finished => return,
                            }
                        }
                    }
                    Ok(None) => {
                        // A final line may arrive without a trailing newline
                        if let LineOutcome::Finished = forward_line(&buffer, &tx).await {
                            return;
                        }
                        warn!("Generation stream closed before the model reported completion");
                        let _ = tx
                            .send(Err(RagError::Generation(
                                "stream ended before the answer was complete".into(),
                            )))
                            .await;
                        return;
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(RagError::Generation(format!(
                                "connection to the model was lost: {}",
                                e
                            ))))
                            .await;
                        return;
                    }
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }
}

enum LineOutcome {
    Continue,
    Finished,
}

/// Forward one NDJSON line to the consumer
async fn forward_line(
    line: &[u8],
    tx: &mpsc::Sender<Result<String, RagError>>,
) -> LineOutcome {
    let line = line.trim_ascii();
    if line.is_empty() {
        return LineOutcome::Continue;
    }

    let chunk = match parse_generate_line(line) {
        Ok(chunk) => chunk,
        Err(e) => {
            let _ = tx
                .send(Err(RagError::Generation(format!("{:#}", e))))
                .await;
            return LineOutcome::Finished;
        }
    };

    if let Some(error) = chunk.error {
        let _ = tx.send(Err(RagError::Generation(error))).await;
        return LineOutcome::Finished;
    }

    if !chunk.response.is_empty() && tx.send(Ok(chunk.response)).await.is_err() {
        debug!("Token receiver dropped, stopping generation");
        return LineOutcome::Finished;
    }

    if chunk.done {
        LineOutcome::Finished
    } else {
        LineOutcome::Continue
    }
}
