//! Solver tools exposed to the model.

mod args;
mod catalog;
mod dispatch;
mod errors;
mod host;
mod record;

pub use catalog::{Solver, SolverMeta, catalog};
pub use dispatch::SolverToolHost;
pub use errors::ToolError;
pub use host::ToolHost;
pub use record::{SUMMARY_LIMIT, ToolResult, summarize_arguments};
