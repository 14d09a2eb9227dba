use thiserror::Error;

use crate::model::ModelError;

/// Errors that end a run.
///
/// Tool failures are not among them; they are reported to the model and
/// recorded on the run's [`ToolResult`](crate::ToolResult)s.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("no final answer after {max_turns} model turns")]
    TurnLimitExceeded { max_turns: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
