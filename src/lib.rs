pub mod chat;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod llm;
pub mod ollama;
pub mod pipeline;
pub mod rag;
pub mod repository;
pub mod session;
