use std::result::Result as StdResult;

use thiserror::Error;

/// Errors surfaced by channel and endpoint operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The channel was destroyed; nothing more can be sent on it.
    #[error("channel {0} has been destroyed")]
    Destroyed(String),
    /// The endpoint belongs to a context that has gone away.
    #[error("endpoint '{0}' is closed")]
    EndpointClosed(String),
}

/// Result alias for channel operations.
pub type Result<T> = StdResult<T, Error>;
