pub mod conversation;
pub mod decision;
pub mod service;
pub mod tools;

pub use conversation::Conversation;
pub use decision::{Agent, AgentError, AgentEvent, AgentOutcome, LoopState};
pub use service::{ChatService, ServiceError};
pub use tools::{QueryToolSet, ToolError, ToolExecutor, ValidationReport};

#[cfg(test)]
pub(crate) mod testing;
