use async_trait::async_trait;
use projbot_core::session::{Message, ToolCall};
use serde_json::Value;
use thiserror::Error;

/// What the reasoning function wants next for the current turn.
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    /// A user-facing answer; the turn is over.
    Final(String),
    /// One or more operation invocations to execute before asking again.
    Invoke(Vec<ToolCall>),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("reasoning endpoint unreachable: {0}")]
    Transport(String),
    #[error("reasoning response malformed: {0}")]
    Protocol(String),
}

/// Seam for the reasoning function. The runtime passes the full session
/// history plus the operation schemas; tests script decisions directly.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn decide(&self, messages: &[Message], tools: &[Value]) -> Result<Decision, LlmError>;
}
