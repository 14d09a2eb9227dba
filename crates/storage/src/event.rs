//! Event types for the run journal.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one orchestration run: a single prompt and everything the
/// agent did to answer it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Who a journaled message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// The kind of event that occurred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// A run began with this prompt.
    RunStart { prompt: String },
    /// A message was added to the conversation.
    Message { role: Role, content: String },
    /// The model asked for a tool. `arguments` is the raw JSON text.
    ToolCall { name: String, arguments: String },
    /// A tool call finished; `record` is the serialized tool result.
    ToolResult {
        name: String,
        record: serde_json::Value,
    },
    /// The run produced a final answer after `turns` model calls.
    RunEnd { turns: usize },
}

impl EventKind {
    /// Stable name stored alongside the payload, used for filtering.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStart { .. } => "run_start",
            Self::Message { .. } => "message",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::RunEnd { .. } => "run_end",
        }
    }
}

/// An event in the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub run_id: RunId,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(run_id: RunId, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn message(run_id: RunId, role: Role, content: impl Into<String>) -> Self {
        Self::new(
            run_id,
            EventKind::Message {
                role,
                content: content.into(),
            },
        )
    }
}
