use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::Value;

use crate::core::errors::RagError;
use crate::state::AppState;
use crate::tools::SearchOutput;

/// Body is the tool's own argument object: `{ "query": "...", "topK": 5 }`.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<Json<SearchOutput>, RagError> {
    let output = state.retrieval.call(&payload).await?;
    Ok(Json(output))
}
