use oma_core::acceptance::{AccError, ParseError};
use thiserror::Error;

/// Errors surfaced by the automaton engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A state id, edge id or acceptance-set index is out of bounds.
    #[error("index {index} is out of range (limit {limit})")]
    OutOfRange { index: u32, limit: u32 },
    /// A fixed capacity (acceptance sets, dictionary variables, braces)
    /// would be exceeded.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),
    /// Textual acceptance input could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The argument does not satisfy the documented requirements.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The operation was called on an automaton that does not satisfy its
    /// precondition.
    #[error("precondition violated: {0}")]
    PreconditionViolation(&'static str),
}

impl From<AccError> for Error {
    fn from(e: AccError) -> Self {
        match e {
            AccError::OutOfRange { index, num_sets } => {
                Error::OutOfRange { index, limit: num_sets }
            }
            AccError::CapacityExceeded { requested } => {
                Error::CapacityExceeded(format!("{requested} acceptance sets requested"))
            }
            AccError::FinAcceptance(what) => Error::PreconditionViolation(what),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
