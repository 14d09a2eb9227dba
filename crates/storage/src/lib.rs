//! SQLite-backed journal of agent runs.
//!
//! Every run the orchestrator performs is recorded as a sequence of events:
//! the prompt, each message, each tool call with its raw arguments, each tool
//! result, and the end of the run. The journal answers "which solver did it
//! call, with what, and what came back?" after the fact.
//!
//! # Example
//!
//! ```no_run
//! use storage::{Event, EventKind, EventStore, Role, RunId};
//!
//! let store = EventStore::open("journal.db")?;
//!
//! let run = RunId::new();
//! store.append(&Event::new(run, EventKind::RunStart { prompt: "Pack 4 boxes".into() }))?;
//! store.append(&Event::message(run, Role::Assistant, "Two bins suffice."))?;
//! store.append(&Event::new(run, EventKind::RunEnd { turns: 2 }))?;
//!
//! for event in store.load_run(run, None)? {
//!     println!("{}: {:?}", event.timestamp, event.kind);
//! }
//!
//! for summary in store.list_runs()? {
//!     println!("{}: {} tool calls", summary.id, summary.tool_calls);
//! }
//! # Ok::<(), storage::Error>(())
//! ```

mod error;
mod event;
mod store;

pub use error::{Error, Result};
pub use event::{Event, EventKind, Role, RunId};
pub use store::{EventStore, RunSummary};
