use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("failed to extract '{file}': {message}")]
    Extraction { file: String, message: String },
    #[error("embedding failed: {0}")]
    Embedding(String),
    /// Transient embedding failure (rate limit, 5xx, timeout); eligible for retry.
    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),
    #[error("language model error: {0}")]
    Llm(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl RagError {
    pub fn extraction(file: impl Into<String>, err: impl std::fmt::Display) -> Self {
        RagError::Extraction {
            file: file.into(),
            message: err.to_string(),
        }
    }

    pub fn embedding<E: std::fmt::Display>(err: E) -> Self {
        RagError::Embedding(err.to_string())
    }

    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        RagError::Storage(err.to_string())
    }

    pub fn configuration<E: std::fmt::Display>(err: E) -> Self {
        RagError::Configuration(err.to_string())
    }

    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        RagError::Internal(err.to_string())
    }

    /// Maps a transport-level `reqwest` failure onto the embedding taxonomy.
    pub fn from_embedding_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            RagError::EmbeddingUnavailable(err.to_string())
        } else {
            RagError::Embedding(err.to_string())
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, RagError::EmbeddingUnavailable(_))
    }
}

impl IntoResponse for RagError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            RagError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RagError::NotFound(_) => StatusCode::NOT_FOUND,
            RagError::Embedding(_) | RagError::Llm(_) | RagError::Extraction { .. } => {
                StatusCode::BAD_GATEWAY
            }
            RagError::EmbeddingUnavailable(_) | RagError::Storage(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RagError::Configuration(_) | RagError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
