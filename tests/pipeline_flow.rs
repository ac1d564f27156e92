use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::Cursor;
use std::path::PathBuf;

use repo_chat::chat::run_chat_loop;
use repo_chat::config::Config;
use repo_chat::embeddings::{Embedder, Embedding};
use repo_chat::error::RagError;
use repo_chat::llm::{LanguageModel, TokenStream};
use repo_chat::pipeline::{run_pipeline, ModelBackend};
use repo_chat::session::SessionState;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const DIMS: usize = 16;

/// Hashes each lowercase word onto one of `DIMS` buckets
struct HashingEmbedder;

impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing"
    }

    async fn embed(&self, text: &str) -> Result<Embedding, RagError> {
        let mut values = vec![0.0f32; DIMS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            values[(hasher.finish() % DIMS as u64) as usize] += 1.0;
        }
        Ok(Embedding { values })
    }
}

/// Streams the context lines of the prompt back, word by word
struct EchoLlm {
    system_prompt: String,
}

impl LanguageModel for EchoLlm {
    fn model_name(&self) -> &str {
        "echo"
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    async fn generate(&self, prompt: &str) -> Result<TokenStream, RagError> {
        let words: Vec<String> = prompt
            .split_whitespace()
            .map(|w| format!("{} ", w))
            .collect();
        let (tx, rx) = mpsc::channel(words.len().max(1));
        for word in words {
            tx.try_send(Ok(word)).expect("channel sized for every word");
        }
        Ok(ReceiverStream::new(rx))
    }
}

struct FakeBackend {
    known_embedding_models: Vec<&'static str>,
}

impl ModelBackend for FakeBackend {
    type Embedder = HashingEmbedder;
    type Llm = EchoLlm;

    async fn connect_llm(&self, config: &Config) -> Result<EchoLlm, RagError> {
        Ok(EchoLlm {
            system_prompt: config.system_prompt.clone(),
        })
    }

    async fn connect_embedder(&self, config: &Config) -> Result<HashingEmbedder, RagError> {
        if self
            .known_embedding_models
            .contains(&config.embedding_model.as_str())
        {
            Ok(HashingEmbedder)
        } else {
            Err(RagError::EmbeddingSetup(format!(
                "unknown embedding model {}",
                config.embedding_model
            )))
        }
    }
}

fn backend() -> FakeBackend {
    FakeBackend {
        known_embedding_models: vec!["nomic-embed-text"],
    }
}

fn config(top_k: usize, embedding_model: &str) -> Config {
    let mut config = Config::from_yaml(
        r#"
selected_model: "llama3"
ollama_endpoint: "http://localhost:11434"
system_prompt: "You are an assistant answering questions about a code repository."
embedding_model: "nomic-embed-text"
"#,
    )
    .unwrap();
    config.top_k = top_k;
    config.embedding_model = embedding_model.to_string();
    config.validate().unwrap();
    config
}

fn single_file_repo(root: &TempDir) -> PathBuf {
    let data = root.path().join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("a.py"), "def f(): pass").unwrap();
    data
}

#[tokio::test]
async fn answers_question_about_single_file_then_stops_on_sentinel() {
    let root = TempDir::new().unwrap();
    let data = single_file_repo(&root);
    let mut session = SessionState::new();

    let report = run_pipeline(&config(1, "nomic-embed-text"), &mut session, &backend(), &data)
        .await
        .unwrap();
    assert_eq!(report.documents, 1);
    assert_eq!(report.chunks, 1);
    assert!(!data.exists(), "scratch directory is removed after indexing");

    let engine = session.query_engine().expect("query engine is built");

    let retrieved = engine.retrieve("what does f do?").await.unwrap();
    assert_eq!(retrieved.len(), 1);
    assert_eq!(retrieved[0].chunk.source_path, "a.py");
    assert_eq!(retrieved[0].chunk.text, "def f(): pass");

    let mut output = Vec::new();
    let summary = run_chat_loop(
        engine,
        Cursor::new("what does f do?\nEOF\n".to_string()),
        &mut output,
    )
    .await
    .unwrap();
    let output = String::from_utf8(output).unwrap();

    assert_eq!(summary.turns, 1);
    assert_eq!(summary.failed_turns, 0);
    assert!(output.contains("def f(): pass"));
    assert!(output.contains("Query: what does f do?"));
    assert!(output.ends_with("\n\nQuestion: "));
}

#[tokio::test]
async fn retrieval_is_capped_by_top_k() {
    let root = TempDir::new().unwrap();
    let data = root.path().join("data");
    fs::create_dir_all(data.join("pkg")).unwrap();
    for i in 0..5 {
        let source = format!("def f{}(): return {}", i, i);
        fs::write(data.join(format!("pkg/m{}.py", i)), source).unwrap();
    }
    fs::write(data.join("pkg/blob.bin"), [0u8, 1, 2]).unwrap();

    let mut session = SessionState::new();
    let report = run_pipeline(&config(3, "nomic-embed-text"), &mut session, &backend(), &data)
        .await
        .unwrap();
    assert_eq!(report.documents, 5);

    let engine = session.query_engine().unwrap();
    let retrieved = engine.retrieve("return value of f2").await.unwrap();
    assert_eq!(retrieved.len(), 3);
    assert!(retrieved.iter().all(|c| c.index_id == engine.index().id()));
}

#[tokio::test]
async fn index_build_is_deterministic() {
    let mut indexes = Vec::new();
    for _ in 0..2 {
        let root = TempDir::new().unwrap();
        let data = root.path().join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("a.py"), "def f(): pass\n\ndef g(): return f()").unwrap();
        fs::write(data.join("b.rs"), "fn main() { println!(\"hi\"); }").unwrap();

        let mut config = config(2, "nomic-embed-text");
        config.chunk_size = 3;
        config.chunk_overlap = 1;

        let mut session = SessionState::new();
        run_pipeline(&config, &mut session, &backend(), &data)
            .await
            .unwrap();
        let engine = session.query_engine().unwrap();
        let entries: Vec<(String, usize, Vec<f32>)> = engine
            .index()
            .entries()
            .iter()
            .map(|e| (e.chunk.text.clone(), e.chunk.position, e.embedding.values.clone()))
            .collect();
        indexes.push(entries);
    }

    assert!(indexes[0].len() > 2);
    assert_eq!(indexes[0], indexes[1]);
}

#[tokio::test]
async fn rejected_embedding_model_fails_setup_before_chat() {
    let root = TempDir::new().unwrap();
    let data = single_file_repo(&root);
    let mut session = SessionState::new();

    let err = run_pipeline(&config(1, "no-such-embedder"), &mut session, &backend(), &data)
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::EmbeddingSetup(_)));
    assert!(err.is_fatal());
    assert!(session.query_engine().is_none());
    assert!(data.exists(), "nothing is cleaned up after a failed setup");
}
