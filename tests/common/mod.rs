#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use berkshire_rag::core::errors::RagError;
use berkshire_rag::llm::{ChatRequest, LlmProvider, LlmService};
use berkshire_rag::rag::{
    DocumentLoader, ExtractedText, IngestionOptions, IngestionPipeline, PdfExtractor,
    SqliteVectorStore, VectorStore,
};

pub const DIMENSION: usize = 256;
pub const INDEX: &str = "document_chunks";

/// Treats every "PDF" as UTF-8 text; files whose text starts with `%CORRUPT` fail.
pub struct PlainTextExtractor;

impl PdfExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedText, RagError> {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        let text = std::fs::read_to_string(path).map_err(|e| RagError::extraction(&name, e))?;
        if text.starts_with("%CORRUPT") {
            return Err(RagError::extraction(&name, "invalid cross-reference table"));
        }
        Ok(ExtractedText {
            text,
            page_count: 1,
        })
    }
}

/// Deterministic bag-of-words embeddings. Batches containing `poison` fail permanently.
pub struct BagOfWordsProvider;

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIMENSION];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        let bucket = word
            .bytes()
            .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
            % DIMENSION;
        vector[bucket] += 1.0;
    }
    if vector.iter().all(|v| *v == 0.0) {
        vector[0] = 1.0;
    }
    vector
}

#[async_trait]
impl LlmProvider for BagOfWordsProvider {
    fn name(&self) -> &str {
        "bag-of-words"
    }

    async fn health_check(&self) -> Result<bool, RagError> {
        Ok(true)
    }

    async fn chat(&self, _request: ChatRequest, _model_id: &str) -> Result<String, RagError> {
        Ok(r#"{"type":"final","content":"ok"}"#.to_string())
    }

    async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, RagError> {
        if inputs.iter().any(|t| t.contains("poison")) {
            return Err(RagError::Embedding("input rejected by moderation".into()));
        }
        Ok(inputs.iter().map(|t| bag_of_words(t)).collect())
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub source: std::path::PathBuf,
    pub store: Arc<SqliteVectorStore>,
    pub llm: LlmService,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("letters");
        std::fs::create_dir_all(&source).unwrap();
        let store = Arc::new(
            SqliteVectorStore::with_path(dir.path().join("vectors.db"), Duration::from_secs(5))
                .await
                .unwrap(),
        );
        let llm = LlmService::new(
            Arc::new(BagOfWordsProvider),
            "gpt-4o",
            "text-embedding-3-small",
            DIMENSION,
        );
        Self {
            dir,
            source,
            store,
            llm,
        }
    }

    pub fn write_letter(&self, file_name: &str, text: &str) {
        std::fs::write(self.source.join(file_name), text).unwrap();
    }

    pub fn pipeline(&self, batch_size: usize) -> IngestionPipeline {
        let loader = DocumentLoader::new(Arc::new(PlainTextExtractor), "pdf", Duration::from_secs(5));
        let store: Arc<dyn VectorStore> = self.store.clone();
        IngestionPipeline::new(
            loader,
            self.llm.clone(),
            store,
            IngestionOptions {
                index_name: INDEX.to_string(),
                target_size: 200,
                overlap_size: 40,
                batch_size,
                extract_concurrency: 2,
            },
        )
    }
}

pub fn letter(year: u32, topic: &str) -> String {
    (0..8)
        .map(|i| {
            format!(
                "In {} our {} results improved again in paragraph {}. Charlie and I remain focused on {} for the long term.",
                year, topic, i, topic
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}
