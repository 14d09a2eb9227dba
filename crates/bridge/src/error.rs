//! Bridge error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while bootstrapping or talking to the Julia runtime.
///
/// The variants fall into two groups. `InvalidInput` is a caller error: the
/// arguments were rejected before any program reached Julia. `Eval` carries a
/// fault raised by Julia itself while running a synthesized program. Every
/// other variant is an environment or transport failure.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("failed to spawn julia: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("julia session not started")]
    NotStarted,

    #[error("julia session exited unexpectedly")]
    SessionExited,

    #[error("I/O error talking to julia: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed julia response: {0}")]
    Protocol(String),

    #[error("response too large: {size} bytes (max {max})")]
    OutputTooLarge { size: usize, max: usize },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("julia error: {0}")]
    Eval(String),

    #[error("julia {found} is too old, {required} or newer is required")]
    VersionTooOld { found: String, required: &'static str },

    #[error("runtime environment setup failed: {0}")]
    Environment(String),

    #[error("failed to prepare runtime directory {path}: {source}")]
    Layout {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Whether the caller supplied bad arguments, as opposed to the runtime
    /// failing.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
