//! Data model shared by the ingestion pipeline and the retrieval tool.

use serde::{Deserialize, Serialize};

/// Raw text extracted from one source file. Discarded once chunked.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub file_name: String,
    pub year: String,
    pub raw_text: String,
    pub page_count: usize,
}

/// One window of a document's text, before embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub ordinal_index: usize,
    pub sibling_count: usize,
    pub source_file_name: String,
    pub source_year: String,
}

impl Chunk {
    /// Stable record id; re-ingesting the same document overwrites these ids.
    pub fn id(&self) -> String {
        chunk_id(&self.source_year, self.ordinal_index)
    }

    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            source: self.source_file_name.clone(),
            year: self.source_year.clone(),
            chunk_index: self.ordinal_index,
            total_chunks: self.sibling_count,
        }
    }
}

pub fn chunk_id(year: &str, ordinal_index: usize) -> String {
    format!("{}-chunk-{}", year, ordinal_index)
}

/// Metadata persisted next to every vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub source: String,
    pub year: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub id: String,
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl EmbeddedChunk {
    pub fn new(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.id(),
            metadata: chunk.metadata(),
            text: chunk.text,
            vector,
        }
    }
}

/// One shaped retrieval hit; higher `similarity` is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub text: String,
    pub year: String,
    pub source: String,
    pub similarity: f32,
}
