use crate::tools::ToolDefinition;

const PERSONA: &str = "You are a knowledgeable financial analyst specializing in Warren Buffett's \
investment philosophy and Berkshire Hathaway's business strategy. Your expertise comes from \
analyzing years of Berkshire Hathaway annual shareholder letters.

Core responsibilities:
- Answer questions about Warren Buffett's investment principles and philosophy
- Explain Berkshire Hathaway's business strategies and decisions
- Reference specific examples from the shareholder letters
- Keep context across the conversation for follow-up questions

Guidelines:
- Ground every answer only in passages returned by the search tool
- Quote the letters directly when relevant and cite the source file and year of each quote
- If the search returns nothing relevant, say plainly that the letters do not cover it; never invent an answer
- Give year-specific context when views or strategies changed over time
- For numbers or acquisitions, cite the exact letter and year
- Explain financial concepts in accessible terms without losing accuracy
- End with a short list of the source letters you used";

pub fn build_agent_instructions(tools: &[ToolDefinition]) -> String {
    let tool_block = if tools.is_empty() {
        "None. Answer from the conversation only and say when the letters cannot be searched."
            .to_string()
    } else {
        tools
            .iter()
            .map(|tool| {
                format!(
                    "- {}: {}\n  arguments (JSON schema): {}",
                    tool.name, tool.description, tool.parameters
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "{PERSONA}\n\n\
You have access to the following tools:\n{tool_block}\n\n\
When you need to use a tool, respond ONLY with JSON in this format:\n\
{{\"type\":\"tool_call\",\"tool_name\":\"<tool>\",\"tool_args\":{{...}}}}\n\
When you have the final answer, respond ONLY with JSON in this format:\n\
{{\"type\":\"final\",\"content\":\"...\"}}\n\
Do not include any extra text outside the JSON."
    )
}

/// Prompt used once the tool budget is spent.
pub fn final_answer_instruction() -> &'static str {
    "The tool budget for this turn is exhausted. Using only the search results above, write the \
final answer now as plain text. If none of the results were relevant, say so."
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn instructions_embed_tool_schema_and_protocol() {
        let tools = vec![ToolDefinition {
            name: "search_letters".to_string(),
            description: "Search the letters".to_string(),
            parameters: json!({ "type": "object", "required": ["query"] }),
        }];

        let text = build_agent_instructions(&tools);
        assert!(text.contains("search_letters: Search the letters"));
        assert!(text.contains("\"required\":[\"query\"]"));
        assert!(text.contains("{\"type\":\"tool_call\""));
        assert!(text.contains("cite the source file and year"));
    }
}
