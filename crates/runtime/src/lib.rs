//! GraphBees runtime: the model loop and the solver tools it drives.
//!
//! # Overview
//!
//! - **Backend**: a trait abstracting chat-completion providers, with an
//!   OpenAI-compatible implementation in [`OpenAiBackend`].
//! - **ToolHost**: the boundary between the loop and side effects.
//!   [`SolverToolHost`] serves the solver catalog from a `bridge::Runtime`.
//! - **Orchestrator**: seeds each run with the system prompt, lets the model
//!   call tools until it answers, and records a [`ToolResult`] per call.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use bridge::{Bridge, RuntimeLayout, RuntimeSettings};
//! use runtime::{OpenAiBackend, Orchestrator, SolverToolHost};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bridge = Arc::new(Bridge::new(RuntimeLayout::configure(&RuntimeSettings::default())?, "julia"));
//! bridge.ensure_ready().await?;
//!
//! let backend = OpenAiBackend::builder("sk-...", "https://api.deepseek.com", "deepseek-chat").build()?;
//! let orchestrator = Orchestrator::new(backend, SolverToolHost::new(bridge));
//!
//! let outcome = orchestrator.run("I have $100 and five gifts to choose from...").await?;
//! println!("{}", outcome.answer);
//! for call in &outcome.tool_results {
//!     println!("{} took {}s", call.tool(), call.elapsed_s());
//! }
//! # Ok(())
//! # }
//! ```

mod error;
pub mod model;
mod orchestrator;
mod prompt;
pub mod providers;
pub mod tools;

pub use error::{Error, Result};
pub use model::{Backend, Message, ModelError, Role, ToolCall, ToolSpec, Usage};
pub use orchestrator::{DEFAULT_MAX_TURNS, Orchestrator, RunOutcome};
pub use prompt::SYSTEM_PROMPT;
pub use providers::{OpenAiBackend, OpenAiBackendBuilder};
pub use tools::{Solver, SolverMeta, SolverToolHost, ToolError, ToolHost, ToolResult};
