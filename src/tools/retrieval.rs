//! `search_letters`: semantic search over the ingested shareholder letters.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::RagError;
use crate::llm::LlmService;
use crate::rag::store::{Neighbor, VectorStore};
use crate::rag::types::SearchResult;

pub const TOOL_NAME: &str = "search_letters";

const TOOL_DESCRIPTION: &str = "Search through Berkshire Hathaway shareholder letters to find \
relevant passages about Warren Buffett's investment philosophy, business strategies and company \
performance.";

const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchArgs {
    /// The search query to find relevant information in the letters
    pub query: String,
    /// Number of top results to return (default 5)
    #[serde(rename = "topK", default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutput {
    pub results: Vec<SearchResult>,
    pub total_found: usize,
}

impl SearchOutput {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            total_found: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

pub struct RetrievalTool {
    llm: LlmService,
    store: Arc<dyn VectorStore>,
    index_name: String,
    default_top_k: usize,
    max_top_k: usize,
    schema: Value,
    validator: jsonschema::Validator,
}

impl RetrievalTool {
    pub fn new(
        llm: LlmService,
        store: Arc<dyn VectorStore>,
        index_name: impl Into<String>,
        default_top_k: usize,
        max_top_k: usize,
    ) -> Result<Self, RagError> {
        let schema = serde_json::to_value(schemars::schema_for!(SearchArgs))
            .map_err(RagError::internal)?;
        let validator = jsonschema::validator_for(&schema)
            .map_err(|e| RagError::internal(format!("invalid tool schema: {}", e)))?;

        Ok(Self {
            llm,
            store,
            index_name: index_name.into(),
            default_top_k: default_top_k.max(1),
            max_top_k: max_top_k.max(1),
            schema,
            validator,
        })
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: TOOL_NAME.to_string(),
            description: TOOL_DESCRIPTION.to_string(),
            parameters: self.schema.clone(),
        }
    }

    /// Validate raw tool-call arguments and run the search.
    pub async fn call(&self, args: &Value) -> Result<SearchOutput, RagError> {
        let problems: Vec<String> = self
            .validator
            .iter_errors(args)
            .map(|e| e.to_string())
            .collect();
        if !problems.is_empty() {
            return Err(RagError::InvalidInput(format!(
                "{} arguments rejected: {}",
                TOOL_NAME,
                problems.join("; ")
            )));
        }

        let args: SearchArgs = serde_json::from_value(args.clone())
            .map_err(|e| RagError::InvalidInput(e.to_string()))?;
        self.search(&args.query, args.top_k).await
    }

    pub async fn search(&self, query: &str, top_k: Option<usize>) -> Result<SearchOutput, RagError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchOutput::empty());
        }
        let top_k = self.resolve_top_k(top_k);

        tracing::info!("Searching letters for {:?} (topK {})", query, top_k);

        self.ensure_same_embedding_model().await?;
        let vector = self.llm.embed(query).await?;
        let neighbors = self.store.query(&self.index_name, &vector, top_k).await?;

        let results: Vec<SearchResult> = neighbors.into_iter().map(shape_result).collect();
        tracing::debug!("Found {} relevant chunk(s)", results.len());

        Ok(SearchOutput {
            total_found: results.len(),
            results,
        })
    }

    /// Queries never bind the index; that is left to ingestion and `reindex`.
    async fn ensure_same_embedding_model(&self) -> Result<(), RagError> {
        let expected = self.llm.embedding_model();
        match self.store.embedding_model(&self.index_name).await? {
            Some(bound) if bound != expected => Err(RagError::Storage(format!(
                "index '{}' holds embeddings from '{}', not '{}'; run reindex to switch models",
                self.index_name, bound, expected
            ))),
            _ => Ok(()),
        }
    }

    fn resolve_top_k(&self, requested: Option<usize>) -> usize {
        match requested {
            None | Some(0) => self.default_top_k,
            Some(k) => k.min(self.max_top_k),
        }
    }
}

fn metadata_field(metadata: &Value, key: &str) -> String {
    match metadata.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

fn shape_result(neighbor: Neighbor) -> SearchResult {
    SearchResult {
        year: metadata_field(&neighbor.metadata, "year"),
        source: metadata_field(&neighbor.metadata, "source"),
        similarity: 1.0 - neighbor.distance,
        text: neighbor.content,
    }
}
