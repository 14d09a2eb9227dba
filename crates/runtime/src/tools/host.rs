//! Tool host trait.

use super::{SolverMeta, ToolError};
use crate::model::{ToolCall, ToolSpec};
use serde_json::Value;
use std::future::Future;

/// Trait for tool execution hosts.
///
/// Implementations provide tool specifications and execute tool calls.
/// This is the boundary between the model loop and side effects.
pub trait ToolHost: Send + Sync {
    /// Get available tool specifications, in presentation order.
    fn specs(&self) -> &[ToolSpec];

    /// Execute a tool call.
    fn execute(&self, call: &ToolCall) -> impl Future<Output = Result<Value, ToolError>> + Send;

    /// Display metadata for a tool, if the host knows it.
    fn metadata(&self, _name: &str) -> Option<SolverMeta> {
        None
    }

    /// Thread count of whatever computes the results, when there is one.
    fn runtime_threads(&self) -> impl Future<Output = Option<usize>> + Send {
        async { None }
    }
}
