use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during tool execution.
///
/// None of these end a run: the orchestrator reports them back to the model
/// as the tool's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[non_exhaustive]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("solver runtime error: {0}")]
    Runtime(String),
    #[error("failed to encode result: {0}")]
    Encode(String),
}

impl ToolError {
    /// Whether the model (rather than the solver runtime) is at fault.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::UnknownTool(_) | Self::InvalidArguments(_))
    }
}

impl From<bridge::Error> for ToolError {
    fn from(err: bridge::Error) -> Self {
        match err {
            bridge::Error::InvalidInput(msg) => Self::InvalidArguments(msg),
            other => Self::Runtime(other.to_string()),
        }
    }
}
