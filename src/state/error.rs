use thiserror::Error;

use crate::core::errors::RagError;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] RagError),

    #[error("Failed to initialize vector store: {0}")]
    VectorStore(#[source] RagError),

    #[error("Failed to initialize conversation memory: {0}")]
    History(#[source] RagError),

    #[error("Failed to initialize LLM client: {0}")]
    Llm(#[source] RagError),
}
