//! The tool-calling loop.

use std::sync::Arc;
use std::time::Instant;

use storage::{Event, EventKind, EventStore, RunId};
use tracing::{debug, info, warn};

use crate::model::{Backend, Message, ModelRequest, ToolCall, Usage};
use crate::prompt::SYSTEM_PROMPT;
use crate::tools::{ToolHost, ToolResult, summarize_arguments};
use crate::{Error, Result};

/// Model calls allowed per run before it is abandoned.
pub const DEFAULT_MAX_TURNS: usize = 16;

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub answer: String,
    /// One record per tool call, in the order the calls were made.
    pub tool_results: Vec<ToolResult>,
    /// Number of model calls the run took.
    pub turns: usize,
    pub usage: Usage,
}

/// Drives a conversation between a model backend and a tool host.
///
/// Each [`run`](Orchestrator::run) owns its own message history, so one
/// orchestrator can serve any number of independent prompts.
pub struct Orchestrator<B, H> {
    backend: B,
    tools: H,
    max_turns: usize,
    journal: Option<Arc<EventStore>>,
}

impl<B: Backend, H: ToolHost> Orchestrator<B, H> {
    pub fn new(backend: B, tools: H) -> Self {
        Self {
            backend,
            tools,
            max_turns: DEFAULT_MAX_TURNS,
            journal: None,
        }
    }

    /// Cap the number of model calls per run. Zero is treated as one.
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    /// Record every run in `journal`.
    pub fn with_journal(mut self, journal: Arc<EventStore>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn tools(&self) -> &H {
        &self.tools
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Answer one prompt, calling tools as the model asks for them.
    ///
    /// Tool failures are handed back to the model and never end the run.
    /// The run fails when the backend does or when the model is still
    /// calling tools after `max_turns` turns.
    pub async fn run(&self, prompt: &str) -> Result<RunOutcome> {
        let run_id = RunId::new();
        info!(%run_id, "run started");
        self.record(run_id, EventKind::RunStart {
            prompt: prompt.to_string(),
        });

        let mut messages = vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)];
        self.record_message(run_id, &messages[1]);

        let mut tool_results = Vec::new();
        let mut usage = Usage::default();

        for turn in 1..=self.max_turns {
            let response = self
                .backend
                .call(ModelRequest {
                    messages: &messages,
                    tools: self.tools.specs(),
                })
                .await?;
            usage.input_tokens += response.usage.input_tokens;
            usage.output_tokens += response.usage.output_tokens;

            let message = response.message;
            let calls = message.tool_calls();
            self.record_message(run_id, &message);

            if calls.is_empty() {
                info!(%run_id, turn, tool_calls = tool_results.len(), "run finished");
                self.record(run_id, EventKind::RunEnd { turns: turn });
                return Ok(RunOutcome {
                    run_id,
                    answer: message.text(),
                    tool_results,
                    turns: turn,
                    usage,
                });
            }

            debug!(%run_id, turn, calls = calls.len(), "model requested tools");
            messages.push(message);
            for call in &calls {
                let result = self.invoke(run_id, call).await;
                messages.push(Message::tool(&call.id, result.message_content()));
                tool_results.push(result);
            }
        }

        warn!(%run_id, max_turns = self.max_turns, "turn limit reached");
        Err(Error::TurnLimitExceeded {
            max_turns: self.max_turns,
        })
    }

    async fn invoke(&self, run_id: RunId, call: &ToolCall) -> ToolResult {
        self.record(run_id, EventKind::ToolCall {
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        });

        let meta = self.tools.metadata(&call.name);
        let summary = summarize_arguments(&call.arguments);
        let started = Instant::now();
        let result = match self.tools.execute(call).await {
            Ok(value) => {
                let elapsed = started.elapsed();
                let threads = self.tools.runtime_threads().await;
                info!(tool = %call.name, elapsed_s = elapsed.as_secs_f64(), "tool succeeded");
                ToolResult::success(&call.name, meta, summary, value, elapsed, threads)
            }
            Err(err) => {
                let elapsed = started.elapsed();
                warn!(tool = %call.name, error = %err, "tool failed");
                ToolResult::failure(&call.name, meta, summary, err.to_string(), elapsed)
            }
        };

        match serde_json::to_value(&result) {
            Ok(record) => self.record(run_id, EventKind::ToolResult {
                name: call.name.clone(),
                record,
            }),
            Err(err) => warn!(%run_id, error = %err, "could not encode tool result for the journal"),
        }
        result
    }

    fn record_message(&self, run_id: RunId, message: &Message) {
        let content = message.text();
        if !content.is_empty() {
            self.record(run_id, EventKind::Message {
                role: message.role.into(),
                content,
            });
        }
    }

    fn record(&self, run_id: RunId, kind: EventKind) {
        let Some(journal) = &self.journal else {
            return;
        };
        if let Err(err) = journal.append(&Event::new(run_id, kind)) {
            warn!(%run_id, error = %err, "failed to write journal event");
        }
    }
}
