use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::RagError;
use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, RagError> {
    let index = &state.config.vector_store.index_name;
    let records = state.vector_store.count(index).await?;

    Ok(Json(json!({
        "status": "ok",
        "index": index,
        "records": records,
        "chatModel": state.llm.chat_model(),
        "embeddingModel": state.llm.embedding_model(),
    })))
}
