//! CLI error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// CLI errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The journal file does not exist.
    ///
    /// This typically means no run has been made yet.
    #[error("journal not found at {path}. Run 'graphbees ask' first")]
    JournalNotFound { path: PathBuf },

    /// No run was found matching the given prefix.
    #[error("no run found matching '{prefix}'")]
    RunNotFound { prefix: String },

    /// Multiple runs match the given prefix.
    ///
    /// The user should provide a longer prefix to disambiguate.
    #[error("multiple runs match '{prefix}': {matches:?}")]
    AmbiguousRun {
        prefix: String,
        matches: Vec<String>,
    },

    /// Configuration is invalid or missing required fields.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A tool invoked directly with `call` failed.
    #[error(transparent)]
    Tool(#[from] runtime::ToolError),

    /// An error occurred in the runtime layer.
    #[error(transparent)]
    Runtime(#[from] runtime::Error),

    /// The model provider could not be set up.
    #[error(transparent)]
    Model(#[from] runtime::ModelError),

    /// The Julia runtime failed to start or bootstrap.
    #[error(transparent)]
    Bridge(#[from] bridge::Error),

    /// An error occurred in the storage layer.
    #[error(transparent)]
    Storage(#[from] storage::Error),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
