use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use crate::core::errors::RagError;
use crate::state::AppState;

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, RagError> {
    let sessions = state.history.list_sessions().await?;
    Ok(Json(json!({ "sessions": sessions })))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, RagError> {
    let session = state
        .history
        .get_session(&session_id)
        .await?
        .ok_or_else(|| RagError::NotFound(format!("session {}", session_id)))?;
    Ok(Json(json!({ "session": session })))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, RagError> {
    if !state.history.delete_session(&session_id).await? {
        return Err(RagError::NotFound(format!("session {}", session_id)));
    }
    Ok(Json(json!({ "deleted": session_id })))
}

pub async fn get_session_messages(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, RagError> {
    let limit = params
        .get("limit")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(100);

    let messages: Vec<Value> = state
        .history
        .get_history(&session_id, limit)
        .await?
        .into_iter()
        .map(|msg| {
            json!({
                "role": msg.role,
                "content": msg.content,
                "createdAt": msg.created_at,
            })
        })
        .collect();

    Ok(Json(json!({ "sessionId": session_id, "messages": messages })))
}
