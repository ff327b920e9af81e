use std::result::Result as StdResult;

use thiserror::Error;

/// Convenient result type for geometry parsing.
pub type Result<T> = StdResult<T, Error>;

/// Errors produced while parsing placement tokens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The token was empty or whitespace.
    #[error("empty placement token")]
    EmptyPlacement,

    /// The side component is not one of top, right, bottom, left.
    #[error("unknown placement side '{0}'")]
    UnknownSide(String),

    /// The alignment component is not one of start, end.
    #[error("unknown placement alignment '{0}'")]
    UnknownAlignment(String),
}
