//! Source discovery and PDF text extraction.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lopdf::Document;

use super::types::SourceDocument;
use crate::core::errors::RagError;

#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: usize,
}

/// Blocking text extraction; callers run it on the blocking pool.
pub trait PdfExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<ExtractedText, RagError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedText, RagError> {
        let name = display_name(path);
        let doc = Document::load(path).map_err(|e| RagError::extraction(&name, e))?;

        let pages = doc.get_pages();
        let mut parts = Vec::with_capacity(pages.len());
        for page_number in pages.keys() {
            let text = doc
                .extract_text(&[*page_number])
                .map_err(|e| RagError::extraction(&name, format!("page {}: {}", page_number, e)))?;
            let text = text.trim();
            if !text.is_empty() {
                parts.push(text.to_string());
            }
        }

        Ok(ExtractedText {
            text: parts.join("\n\n"),
            page_count: pages.len(),
        })
    }
}

/// Lists source files and turns each one into a `SourceDocument`.
#[derive(Clone)]
pub struct DocumentLoader {
    extractor: Arc<dyn PdfExtractor>,
    extension: String,
    timeout: Duration,
}

impl DocumentLoader {
    pub fn new(extractor: Arc<dyn PdfExtractor>, extension: &str, timeout: Duration) -> Self {
        Self {
            extractor,
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
            timeout,
        }
    }

    /// Files in `dir` with the configured extension, sorted by file name.
    pub async fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>, RagError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| RagError::Configuration(format!("cannot read {}: {}", dir.display(), e)))?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(RagError::internal)? {
            let path = entry.path();
            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case(&self.extension))
                .unwrap_or(false);
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if matches && is_file {
                files.push(path);
            }
        }

        files.sort_by_key(|p| p.file_name().map(|n| n.to_os_string()));
        Ok(files)
    }

    pub async fn load(&self, path: &Path) -> Result<SourceDocument, RagError> {
        let file_name = display_name(path);
        let extractor = self.extractor.clone();
        let owned = path.to_path_buf();

        let task = tokio::task::spawn_blocking(move || extractor.extract(&owned));
        let extracted = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_err)) => return Err(RagError::extraction(&file_name, join_err)),
            Err(_) => {
                return Err(RagError::extraction(
                    &file_name,
                    format!("timed out after {:?}", self.timeout),
                ))
            }
        };

        Ok(SourceDocument {
            year: year_label(path),
            file_name,
            raw_text: extracted.text,
            page_count: extracted.page_count,
        })
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// The file stem (`2019.pdf` -> `2019`). Chunk ids are keyed on it, so distinct
/// file names never share ids.
pub fn year_label(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
