//! Document ingestion and vector storage.
//!
//! - `loader`: source discovery and PDF text extraction
//! - `chunker`: sentence-respecting overlapping windows
//! - `store` / `sqlite`: vector index interface and its SQLite backend
//! - `pipeline`: the ingestion runner

pub mod chunker;
pub mod loader;
pub mod pipeline;
pub mod sqlite;
pub mod store;
pub mod types;

pub use chunker::{chunk_document, chunk_text};
pub use loader::{DocumentLoader, ExtractedText, LopdfExtractor, PdfExtractor};
pub use pipeline::{
    IngestionError, IngestionOptions, IngestionPipeline, IngestionReport, ProgressEvent,
};
pub use sqlite::SqliteVectorStore;
pub use store::{IndexInfo, Neighbor, VectorRecord, VectorStore};
pub use types::{Chunk, ChunkMetadata, EmbeddedChunk, SearchResult, SourceDocument};
