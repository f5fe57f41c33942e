pub mod retrieval;

pub use retrieval::{RetrievalTool, SearchArgs, SearchOutput, ToolDefinition, TOOL_NAME};
