use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use super::instructions::{build_agent_instructions, final_answer_instruction};
use crate::core::config::AgentConfig;
use crate::core::errors::RagError;
use crate::history::HistoryStore;
use crate::llm::{ChatMessage, LlmService};
use crate::rag::types::SearchResult;
use crate::tools::{RetrievalTool, TOOL_NAME};

#[derive(Debug, Clone, PartialEq)]
enum AgentDecision {
    Final(String),
    ToolCall { name: String, args: Value },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReply {
    pub session_id: String,
    pub content: String,
    pub sources: Vec<SearchResult>,
    pub tool_calls: usize,
}

/// Conversational agent that answers from the letters via `search_letters`.
pub struct Agent {
    llm: LlmService,
    tool: Arc<RetrievalTool>,
    history: HistoryStore,
    instructions: String,
    max_steps: usize,
    history_limit: i64,
}

impl Agent {
    pub fn new(
        llm: LlmService,
        tool: Arc<RetrievalTool>,
        history: HistoryStore,
        config: &AgentConfig,
    ) -> Self {
        let instructions = build_agent_instructions(&[tool.definition()]);
        Self {
            llm,
            tool,
            history,
            instructions,
            max_steps: config.max_steps.max(1),
            history_limit: config.history_limit,
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Run one conversational turn, creating a session when none is given.
    pub async fn respond(
        &self,
        session_id: Option<&str>,
        user_input: &str,
    ) -> Result<AgentReply, RagError> {
        let user_input = user_input.trim();
        if user_input.is_empty() {
            return Err(RagError::InvalidInput("message must not be empty".to_string()));
        }

        let session_id = match session_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => self.history.create_session(Some(session_title(user_input))).await?,
        };

        let mut messages = self.build_messages(&session_id, user_input).await?;
        let mut sources: Vec<SearchResult> = Vec::new();
        let mut tool_calls = 0usize;
        let mut answer = None;

        for step in 0..self.max_steps {
            tracing::debug!(
                "Agent step {}/{} for session {}",
                step + 1,
                self.max_steps,
                session_id
            );
            let response = self.llm.chat(messages.clone()).await?;

            match parse_agent_decision(&response) {
                AgentDecision::Final(content) => {
                    answer = Some(content);
                    break;
                }
                AgentDecision::ToolCall { name, args } => {
                    messages.push(ChatMessage::assistant(response.trim()));
                    if name != TOOL_NAME {
                        messages.push(ChatMessage::system(format!(
                            "Tool `{}` does not exist. The only tool is `{}`.",
                            name, TOOL_NAME
                        )));
                        continue;
                    }

                    tool_calls += 1;
                    let payload = match self.tool.call(&args).await {
                        Ok(output) => {
                            tracing::info!(
                                "search_letters returned {} result(s)",
                                output.total_found
                            );
                            let rendered =
                                serde_json::to_string(&output).map_err(RagError::internal)?;
                            merge_sources(&mut sources, output.results);
                            format!("Tool `{}` result:\n{}", name, rendered)
                        }
                        Err(err) => {
                            tracing::warn!("search_letters failed: {}", err);
                            format!("Tool `{}` failed: {}", name, err)
                        }
                    };

                    let metadata = json!({
                        "tool": name,
                        "timestamp": chrono::Utc::now().to_rfc3339(),
                    });
                    self.history
                        .add_message(&session_id, "tool", &payload, Some(metadata))
                        .await?;
                    messages.push(ChatMessage::system(payload));
                }
            }
        }

        let content = match answer {
            Some(content) => content,
            None => {
                tracing::info!("Agent tool budget exhausted; requesting final answer");
                messages.push(ChatMessage::system(final_answer_instruction()));
                match parse_agent_decision(&self.llm.chat(messages).await?) {
                    AgentDecision::Final(content) => content,
                    AgentDecision::ToolCall { .. } => {
                        "I could not reach a final answer within the allowed number of searches."
                            .to_string()
                    }
                }
            }
        };

        self.history
            .add_message(
                &session_id,
                "assistant",
                &content,
                Some(json!({ "sources": sources.len() })),
            )
            .await?;

        Ok(AgentReply {
            session_id,
            content,
            sources,
            tool_calls,
        })
    }

    async fn build_messages(
        &self,
        session_id: &str,
        user_input: &str,
    ) -> Result<Vec<ChatMessage>, RagError> {
        let mut messages = vec![ChatMessage::system(self.instructions.clone())];

        for msg in self.history.get_history(session_id, self.history_limit).await? {
            if msg.content.trim().is_empty() {
                continue;
            }
            messages.push(match msg.role.as_str() {
                "assistant" => ChatMessage::assistant(msg.content),
                "tool" | "system" => ChatMessage::system(msg.content),
                _ => ChatMessage::user(msg.content),
            });
        }

        self.history
            .add_message(session_id, "user", user_input, None)
            .await?;
        messages.push(ChatMessage::user(user_input));
        Ok(messages)
    }
}

fn session_title(input: &str) -> String {
    let title: String = input.chars().take(60).collect();
    if input.chars().count() > 60 {
        format!("{}…", title.trim_end())
    } else {
        title
    }
}

fn merge_sources(sources: &mut Vec<SearchResult>, results: Vec<SearchResult>) {
    for result in results {
        let seen = sources
            .iter()
            .any(|s| s.source == result.source && s.text == result.text);
        if !seen {
            sources.push(result);
        }
    }
}

fn parse_agent_decision(text: &str) -> AgentDecision {
    if let Some(json_value) = parse_json_from_text(text) {
        if let Some(decision) = parse_agent_decision_from_value(&json_value) {
            return decision;
        }
    }
    AgentDecision::Final(text.trim().to_string())
}

fn parse_agent_decision_from_value(value: &Value) -> Option<AgentDecision> {
    let action_type = value
        .get("type")
        .or_else(|| value.get("action"))
        .and_then(|v| v.as_str())
        .unwrap_or("");

    match action_type {
        "tool_call" => {
            let name = value
                .get("tool_name")
                .or_else(|| value.get("name"))
                .or_else(|| value.get("tool"))
                .and_then(|v| v.as_str())?;
            let args = value
                .get("tool_args")
                .or_else(|| value.get("args"))
                .cloned()
                .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
            Some(AgentDecision::ToolCall {
                name: name.to_string(),
                args,
            })
        }
        "final" => Some(AgentDecision::Final(
            value
                .get("content")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
        )),
        _ => None,
    }
}

fn parse_json_from_text(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end]).ok()
}
