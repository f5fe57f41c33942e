use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::agent::AgentReply;
use crate::core::errors::RagError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequestBody {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequestBody>,
) -> Result<Json<AgentReply>, RagError> {
    let reply = state
        .agent
        .respond(payload.session_id.as_deref(), &payload.message)
        .await?;
    Ok(Json(reply))
}
