//! VectorStore trait: the narrow interface the pipeline and retrieval tool use
//! to persist and query embedded chunks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::EmbeddedChunk;
use crate::core::errors::RagError;

/// A record written by `upsert`.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub content: String,
    pub metadata: Value,
    pub vector: Vec<f32>,
}

impl From<EmbeddedChunk> for VectorRecord {
    fn from(chunk: EmbeddedChunk) -> Self {
        Self {
            metadata: serde_json::to_value(&chunk.metadata).unwrap_or(Value::Null),
            id: chunk.id,
            content: chunk.text,
            vector: chunk.vector,
        }
    }
}

/// A nearest-neighbour hit. `distance` is cosine distance (lower = closer).
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub id: String,
    pub content: String,
    pub metadata: Value,
    pub distance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub dimension: usize,
    pub embedding_model: Option<String>,
    pub records: usize,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create an index. Already existing with the same dimension is not an error.
    async fn create_index(&self, name: &str, dimension: usize) -> Result<(), RagError>;

    /// Record which embedding model fills this index.
    ///
    /// Fails when the index is already bound to a different model.
    async fn bind_embedding_model(&self, name: &str, model: &str) -> Result<(), RagError>;

    /// The model an index is bound to, if any. Read-only.
    async fn embedding_model(&self, name: &str) -> Result<Option<String>, RagError>;

    /// Insert or replace records by id, all-or-nothing.
    async fn upsert(&self, name: &str, records: &[VectorRecord]) -> Result<usize, RagError>;

    /// Up to `top_k` records ordered by ascending distance.
    async fn query(&self, name: &str, vector: &[f32], top_k: usize)
        -> Result<Vec<Neighbor>, RagError>;

    async fn count(&self, name: &str) -> Result<usize, RagError>;

    async fn describe(&self) -> Result<Vec<IndexInfo>, RagError>;

    /// Drop every record in the index and rebind it to `model`.
    ///
    /// Used when the embedding model changes and all vectors are invalidated.
    async fn reindex(&self, name: &str, model: &str) -> Result<(), RagError>;
}
