//! Ingestion: discover → extract+chunk → embed+store.
//!
//! Per-document and per-batch failures are recorded as tagged outcomes and
//! folded into the `IngestionReport`; only problems with the run as a whole
//! (missing or unreadable source, no documents, unusable index) are returned as errors.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use super::chunker::chunk_document;
use super::loader::DocumentLoader;
use super::store::{VectorRecord, VectorStore};
use super::types::{Chunk, EmbeddedChunk};
use crate::core::config::AppConfig;
use crate::core::errors::RagError;
use crate::llm::LlmService;

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub index_name: String,
    pub target_size: usize,
    pub overlap_size: usize,
    pub batch_size: usize,
    pub extract_concurrency: usize,
}

impl IngestionOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            index_name: config.vector_store.index_name.clone(),
            target_size: config.chunking.target_size,
            overlap_size: config.chunking.overlap_size,
            batch_size: config.ingestion.batch_size,
            extract_concurrency: config.ingestion.extract_concurrency,
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("source directory {0} does not exist")]
    SourceMissing(PathBuf),
    #[error("no source documents found in {0}")]
    NoDocuments(PathBuf),
    #[error("cannot list source documents: {0}")]
    Discovery(#[source] RagError),
    #[error("vector index unavailable: {0}")]
    Index(#[source] RagError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Discovered { documents: usize },
    DocumentChunked { file: String, chunks: usize },
    DocumentFailed { file: String, error: String },
    BatchStored { batch: usize, records: usize },
    BatchFailed { batch: usize, error: String },
}

#[derive(Debug)]
pub enum DocumentOutcome {
    Chunked { file: String, chunks: Vec<Chunk> },
    Failed { file: String, error: String },
}

#[derive(Debug)]
pub enum BatchOutcome {
    Stored { batch: usize, years: Vec<String> },
    /// `embedded` counts chunks that were embedded before the store rejected the batch.
    Failed { batch: usize, embedded: usize, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedDocument {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedBatch {
    pub batch: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    pub documents_processed: usize,
    pub documents_failed: Vec<FailedDocument>,
    pub chunks_created: usize,
    pub chunks_embedded: usize,
    pub chunks_stored: usize,
    pub batches_stored: usize,
    pub batches_failed: Vec<FailedBatch>,
    pub per_year_counts: BTreeMap<String, usize>,
}

impl IngestionReport {
    /// True when nothing useful was ingested.
    pub fn is_total_failure(&self) -> bool {
        self.documents_processed == 0 || (self.chunks_created > 0 && self.batches_stored == 0)
    }

    fn record_document(&mut self, outcome: &DocumentOutcome) {
        match outcome {
            DocumentOutcome::Chunked { chunks, .. } => {
                self.documents_processed += 1;
                self.chunks_created += chunks.len();
            }
            DocumentOutcome::Failed { file, error } => self.documents_failed.push(FailedDocument {
                file: file.clone(),
                error: error.clone(),
            }),
        }
    }

    fn record_batch(&mut self, outcome: BatchOutcome) {
        match outcome {
            BatchOutcome::Stored { years, .. } => {
                self.batches_stored += 1;
                self.chunks_embedded += years.len();
                self.chunks_stored += years.len();
                for year in years {
                    *self.per_year_counts.entry(year).or_insert(0) += 1;
                }
            }
            BatchOutcome::Failed {
                batch,
                embedded,
                error,
            } => {
                self.chunks_embedded += embedded;
                self.batches_failed.push(FailedBatch { batch, error });
            }
        }
    }
}

pub struct IngestionPipeline {
    loader: DocumentLoader,
    llm: LlmService,
    store: Arc<dyn VectorStore>,
    options: IngestionOptions,
    progress: Option<UnboundedSender<ProgressEvent>>,
}

impl IngestionPipeline {
    pub fn new(
        loader: DocumentLoader,
        llm: LlmService,
        store: Arc<dyn VectorStore>,
        options: IngestionOptions,
    ) -> Self {
        Self {
            loader,
            llm,
            store,
            options,
            progress: None,
        }
    }

    pub fn with_progress(mut self, sender: UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.progress {
            let _ = sender.send(event);
        }
    }

    pub async fn run(&self, source_dir: &Path) -> Result<IngestionReport, IngestionError> {
        let files = self.discover(source_dir).await?;
        self.prepare_index().await?;

        let mut report = IngestionReport::default();
        let mut chunks = Vec::new();
        // year label -> file that claimed it first
        let mut labels: HashMap<String, String> = HashMap::new();

        for outcome in self.extract_all(files).await {
            let outcome = claim_label(&mut labels, outcome);
            self.announce(&outcome);
            report.record_document(&outcome);
            if let DocumentOutcome::Chunked { chunks: doc_chunks, .. } = outcome {
                chunks.extend(doc_chunks);
            }
        }

        for outcome in self.store_batches(chunks).await {
            report.record_batch(outcome);
        }

        tracing::info!(
            processed = report.documents_processed,
            failed = report.documents_failed.len(),
            chunks_stored = report.chunks_stored,
            batches_failed = report.batches_failed.len(),
            "Ingestion finished"
        );
        Ok(report)
    }

    async fn discover(&self, source_dir: &Path) -> Result<Vec<PathBuf>, IngestionError> {
        match tokio::fs::metadata(source_dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(IngestionError::Discovery(RagError::Configuration(format!(
                    "{} is not a directory",
                    source_dir.display()
                ))))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(IngestionError::SourceMissing(source_dir.to_path_buf()))
            }
            Err(err) => {
                return Err(IngestionError::Discovery(RagError::Configuration(format!(
                    "cannot read {}: {}",
                    source_dir.display(),
                    err
                ))))
            }
        }

        let files = self
            .loader
            .discover(source_dir)
            .await
            .map_err(IngestionError::Discovery)?;
        if files.is_empty() {
            return Err(IngestionError::NoDocuments(source_dir.to_path_buf()));
        }

        tracing::info!("Discovered {} document(s) in {}", files.len(), source_dir.display());
        self.emit(ProgressEvent::Discovered {
            documents: files.len(),
        });
        Ok(files)
    }

    async fn prepare_index(&self) -> Result<(), IngestionError> {
        let name = &self.options.index_name;
        self.store
            .create_index(name, self.llm.dimension())
            .await
            .map_err(IngestionError::Index)?;
        self.store
            .bind_embedding_model(name, self.llm.embedding_model())
            .await
            .map_err(IngestionError::Index)
    }

    /// Extract and chunk every file; outcomes keep discovery order.
    async fn extract_all(&self, files: Vec<PathBuf>) -> Vec<DocumentOutcome> {
        stream::iter(files)
            .map(|path| async move { self.extract_one(&path).await })
            .buffered(self.options.extract_concurrency.max(1))
            .collect()
            .await
    }

    async fn extract_one(&self, path: &Path) -> DocumentOutcome {
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        match self.loader.load(path).await {
            Ok(doc) => {
                let chunks = chunk_document(
                    &doc.raw_text,
                    &doc.file_name,
                    &doc.year,
                    self.options.target_size,
                    self.options.overlap_size,
                );
                if chunks.is_empty() {
                    DocumentOutcome::Failed {
                        file,
                        error: "no extractable text".to_string(),
                    }
                } else {
                    tracing::debug!(
                        "{}: {} pages, {} chunks",
                        doc.file_name,
                        doc.page_count,
                        chunks.len()
                    );
                    DocumentOutcome::Chunked { file, chunks }
                }
            }
            Err(err) => DocumentOutcome::Failed {
                file,
                error: err.to_string(),
            },
        }
    }

    /// Logs and reports one document outcome. Called in discovery order.
    fn announce(&self, outcome: &DocumentOutcome) {
        match outcome {
            DocumentOutcome::Chunked { file, chunks } => {
                tracing::info!("Chunked {} into {} chunk(s)", file, chunks.len());
                self.emit(ProgressEvent::DocumentChunked {
                    file: file.clone(),
                    chunks: chunks.len(),
                });
            }
            DocumentOutcome::Failed { file, error } => {
                tracing::warn!("Skipping {}: {}", file, error);
                self.emit(ProgressEvent::DocumentFailed {
                    file: file.clone(),
                    error: error.clone(),
                });
            }
        }
    }

    async fn store_batches(&self, chunks: Vec<Chunk>) -> Vec<BatchOutcome> {
        let batch_size = self.options.batch_size.max(1);
        let mut outcomes = Vec::new();

        for (batch, group) in chunks.chunks(batch_size).enumerate() {
            let outcome = self.store_batch(batch, group).await;
            match &outcome {
                BatchOutcome::Stored { years, .. } => {
                    tracing::info!("Stored batch {} ({} records)", batch, years.len());
                    self.emit(ProgressEvent::BatchStored {
                        batch,
                        records: years.len(),
                    });
                }
                BatchOutcome::Failed { error, .. } => {
                    tracing::error!("Batch {} failed: {}", batch, error);
                    self.emit(ProgressEvent::BatchFailed {
                        batch,
                        error: error.clone(),
                    });
                }
            }
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn store_batch(&self, batch: usize, group: &[Chunk]) -> BatchOutcome {
        let texts: Vec<String> = group.iter().map(|c| c.text.clone()).collect();

        let vectors = match self.llm.embed_batch(&texts).await {
            Ok(vectors) => vectors,
            Err(err) => {
                return BatchOutcome::Failed {
                    batch,
                    embedded: 0,
                    error: err.to_string(),
                }
            }
        };

        let records: Vec<VectorRecord> = group
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedChunk::new(chunk, vector).into())
            .collect();

        match self.store.upsert(&self.options.index_name, &records).await {
            Ok(_) => BatchOutcome::Stored {
                batch,
                years: group.iter().map(|c| c.source_year.clone()).collect(),
            },
            Err(err) => BatchOutcome::Failed {
                batch,
                embedded: records.len(),
                error: err.to_string(),
            },
        }
    }
}

/// Chunk ids are keyed on the year label, so a second document with an already
/// claimed label would overwrite the first one's records. It is failed instead.
fn claim_label(labels: &mut HashMap<String, String>, outcome: DocumentOutcome) -> DocumentOutcome {
    let DocumentOutcome::Chunked { file, chunks } = outcome else {
        return outcome;
    };
    let Some(label) = chunks.first().map(|c| c.source_year.clone()) else {
        return DocumentOutcome::Chunked { file, chunks };
    };

    match labels.get(&label) {
        Some(owner) => DocumentOutcome::Failed {
            error: format!("year label '{}' is already used by {}", label, owner),
            file,
        },
        None => {
            labels.insert(label, file.clone());
            DocumentOutcome::Chunked { file, chunks }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(year: &str, i: usize) -> Chunk {
        Chunk {
            text: format!("text {}", i),
            ordinal_index: i,
            sibling_count: 2,
            source_file_name: format!("{}.pdf", year),
            source_year: year.to_string(),
        }
    }

    #[test]
    fn report_folds_outcomes() {
        let mut report = IngestionReport::default();
        report.record_document(&DocumentOutcome::Chunked {
            file: "2019.pdf".into(),
            chunks: vec![chunk("2019", 0), chunk("2019", 1)],
        });
        report.record_document(&DocumentOutcome::Failed {
            file: "bad.pdf".into(),
            error: "invalid xref".into(),
        });
        report.record_batch(BatchOutcome::Stored {
            batch: 0,
            years: vec!["2019".into(), "2019".into()],
        });
        report.record_batch(BatchOutcome::Failed {
            batch: 1,
            embedded: 0,
            error: "embedding failed".into(),
        });

        assert_eq!(report.documents_processed, 1);
        assert_eq!(report.documents_failed.len(), 1);
        assert_eq!(report.chunks_stored, 2);
        assert_eq!(report.per_year_counts.get("2019"), Some(&2));
        assert_eq!(report.batches_failed[0].batch, 1);
        assert!(!report.is_total_failure());
    }

    #[test]
    fn second_document_with_same_label_fails() {
        let mut labels = HashMap::new();
        let first = claim_label(
            &mut labels,
            DocumentOutcome::Chunked {
                file: "2019.PDF".into(),
                chunks: vec![chunk("2019", 0)],
            },
        );
        let second = claim_label(
            &mut labels,
            DocumentOutcome::Chunked {
                file: "2019.pdf".into(),
                chunks: vec![chunk("2019", 0)],
            },
        );

        assert!(matches!(first, DocumentOutcome::Chunked { .. }));
        match second {
            DocumentOutcome::Failed { file, error } => {
                assert_eq!(file, "2019.pdf");
                assert!(error.contains("2019.PDF"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn no_stored_batch_is_total_failure() {
        let mut report = IngestionReport::default();
        report.record_document(&DocumentOutcome::Chunked {
            file: "2019.pdf".into(),
            chunks: vec![chunk("2019", 0)],
        });
        report.record_batch(BatchOutcome::Failed {
            batch: 0,
            embedded: 1,
            error: "storage error: disk full".into(),
        });

        assert!(report.is_total_failure());
        assert_eq!(report.chunks_embedded, 1);
    }
}
