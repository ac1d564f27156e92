use crate::embeddings::Embedder;
use crate::error::{RagError, Severity};
use crate::llm::LanguageModel;
use crate::rag::QueryEngine;
use futures::StreamExt;
use log::{error, info};
use std::io::{self, BufRead, Write};

/// Input that ends the conversation, compared case-insensitively after trimming
pub const SENTINEL: &str = "EOF";

const PROMPT: &str = "Question: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    AwaitingInput,
    Terminated,
}

/// Counts for a finished conversation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChatSummary {
    pub turns: usize,
    pub failed_turns: usize,
}

/// Whether a line of operator input ends the conversation
pub fn is_sentinel(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case(SENTINEL)
}

/// Read questions from `input` and stream answers to `output` until the sentinel
/// or end of input.
///
/// A retrieval or generation failure fails only the current turn: the error is
/// reported and the loop waits for the next question.
pub async fn run_chat_loop<E, L, R, W>(
    engine: &QueryEngine<E, L>,
    mut input: R,
    mut output: W,
) -> io::Result<ChatSummary>
where
    E: Embedder,
    L: LanguageModel,
    R: BufRead,
    W: Write,
{
    let mut summary = ChatSummary::default();
    let mut state = ChatState::AwaitingInput;
    let mut buffer = Vec::new();

    while state == ChatState::AwaitingInput {
        write!(output, "{}", PROMPT)?;
        output.flush()?;

        buffer.clear();
        // Invalid UTF-8 is replaced rather than rejected; it is still a question
        let read = input.read_until(b'\n', &mut buffer)?;
        let line = String::from_utf8_lossy(&buffer);

        if read == 0 || is_sentinel(&line) {
            info!("Ending chat...");
            state = ChatState::Terminated;
            continue;
        }

        summary.turns += 1;
        let question = line.trim_end_matches(['\r', '\n']);

        if let Err(e) = answer_turn(engine, question, &mut output).await? {
            summary.failed_turns += 1;
            match e.severity() {
                Severity::TurnRecoverable | Severity::Warning => {
                    error!("{}", e);
                    writeln!(output, "[error] {}", e)?;
                }
                Severity::Fatal => {
                    return Err(io::Error::new(io::ErrorKind::Other, e));
                }
            }
        }

        writeln!(output)?;
    }

    Ok(summary)
}

/// Stream one answer. The outer result carries console I/O errors, the inner one
/// pipeline errors for this turn.
async fn answer_turn<E, L, W>(
    engine: &QueryEngine<E, L>,
    question: &str,
    output: &mut W,
) -> io::Result<Result<(), RagError>>
where
    E: Embedder,
    L: LanguageModel,
    W: Write,
{
    let mut tokens = match engine.answer(question).await {
        Ok(tokens) => tokens,
        Err(e) => return Ok(Err(e)),
    };

    let mut wrote_any = false;
    while let Some(token) = tokens.next().await {
        match token {
            Ok(token) => {
                write!(output, "{}", token)?;
                output.flush()?;
                wrote_any = true;
            }
            Err(e) => {
                if wrote_any {
                    writeln!(output)?;
                }
                return Ok(Err(e));
            }
        }
    }

    writeln!(output)?;
    Ok(Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkingPolicy;
    use crate::document::Document;
    use crate::embeddings::Embedding;
    use crate::index::build_index;
    use crate::llm::TokenStream;
    use std::collections::BTreeMap;
    use std::io::Cursor;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    struct ConstantEmbedder;

    impl Embedder for ConstantEmbedder {
        fn model_name(&self) -> &str {
            "constant"
        }

        async fn embed(&self, _text: &str) -> Result<Embedding, RagError> {
            Ok(Embedding {
                values: vec![1.0, 1.0],
            })
        }
    }

    /// Answers "ok", except for questions containing "crash" whose stream fails midway
    struct ScriptedLlm;

    impl LanguageModel for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        fn system_prompt(&self) -> &str {
            "system"
        }

        async fn generate(&self, prompt: &str) -> Result<TokenStream, RagError> {
            let (tx, rx) = mpsc::channel(4);
            if prompt.contains("Query: crash") {
                tx.try_send(Ok("par".to_string())).unwrap();
                tx.try_send(Err(RagError::Generation("endpoint went away".into())))
                    .unwrap();
            } else {
                tx.try_send(Ok("o".to_string())).unwrap();
                tx.try_send(Ok("k".to_string())).unwrap();
            }
            Ok(ReceiverStream::new(rx))
        }
    }

    async fn engine() -> QueryEngine<ConstantEmbedder, ScriptedLlm> {
        let documents = vec![Document {
            text: "def f(): pass".to_string(),
            source_path: "a.py".to_string(),
            metadata: BTreeMap::new(),
        }];
        let index = build_index(&documents, &ConstantEmbedder, &ChunkingPolicy::default(), 1)
            .await
            .unwrap();
        QueryEngine::new(index, ConstantEmbedder, ScriptedLlm, 1)
    }

    async fn run(input: &str) -> (ChatSummary, String) {
        run_bytes(input.as_bytes()).await
    }

    async fn run_bytes(input: &[u8]) -> (ChatSummary, String) {
        let engine = engine().await;
        let mut output = Vec::new();
        let summary = run_chat_loop(&engine, Cursor::new(input.to_vec()), &mut output)
            .await
            .unwrap();
        (summary, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_sentinel_detection() {
        assert!(is_sentinel("EOF"));
        assert!(is_sentinel(" eof "));
        assert!(is_sentinel("Eof"));
        assert!(is_sentinel("EOF\n"));
        assert!(!is_sentinel(""));
        assert!(!is_sentinel("EOF please"));
        assert!(!is_sentinel("E O F"));
    }

    #[tokio::test]
    async fn test_sentinel_ends_immediately() {
        let (summary, output) = run(" eof \nwhat does f do?\n").await;
        assert_eq!(summary.turns, 0);
        assert_eq!(output, "Question: ");
    }

    #[tokio::test]
    async fn test_answers_until_sentinel() {
        let (summary, output) = run("what does f do?\n\nEOF\n").await;
        assert_eq!(summary.turns, 2);
        assert_eq!(summary.failed_turns, 0);
        assert_eq!(output, "Question: ok\n\nQuestion: ok\n\nQuestion: ");
    }

    #[tokio::test]
    async fn test_end_of_input_terminates() {
        let (summary, _) = run("what does f do?\n").await;
        assert_eq!(summary.turns, 1);
    }

    #[tokio::test]
    async fn test_generation_error_fails_only_the_turn() {
        let (summary, output) = run("crash\nwhat does f do?\nEOF\n").await;
        assert_eq!(summary.turns, 2);
        assert_eq!(summary.failed_turns, 1);
        assert!(output.contains("par\n[error] Generation failed: endpoint went away"));
        assert!(output.ends_with("Question: ok\n\nQuestion: "));
    }

    #[tokio::test]
    async fn test_invalid_utf8_question_is_still_a_turn() {
        let (summary, output) = run_bytes(b"caf\xe9?\nwhat does f do?\nEOF\n").await;
        assert_eq!(summary.turns, 2);
        assert_eq!(summary.failed_turns, 0);
        assert_eq!(output, "Question: ok\n\nQuestion: ok\n\nQuestion: ");
    }
}
