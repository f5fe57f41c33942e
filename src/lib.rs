//! Question answering over Berkshire Hathaway shareholder letters.
//!
//! Ingestion turns a directory of PDF letters into embedded chunks in a
//! SQLite vector index; the `search_letters` tool and the agent answer
//! questions from that index.

pub mod agent;
pub mod core;
pub mod history;
pub mod llm;
pub mod rag;
pub mod server;
pub mod state;
pub mod tools;

pub use crate::core::errors::RagError;
pub use crate::state::AppState;
