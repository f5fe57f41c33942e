pub mod instructions;
pub mod runtime;

pub use runtime::{Agent, AgentReply};
