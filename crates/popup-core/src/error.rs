//! Error types for popup-core.

use std::result::Result as StdResult;

use thiserror::Error;

/// Failure reported by a host capability (native runtime, DOM, mounter).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The host refused the request.
    #[error("host rejected request: {0}")]
    Rejected(String),
    /// The capability has gone away.
    #[error("host capability unavailable")]
    Unavailable,
    /// Content could not be materialized.
    #[error("content failed to load: {0}")]
    Content(String),
}

/// Errors surfaced by popup-core.
///
/// Only `NotInitialized`, `NativeHostUnavailable`, `ContentUnsupported`, and
/// `Launch` are ever returned from an open call. Everything else reaches the
/// caller through `on_error` alongside a `programmatic` result.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// No adapter has been selected.
    #[error("popup provider is not initialized")]
    NotInitialized,
    /// The container environment was forced but no runtime is present.
    #[error("native container runtime is not available")]
    NativeHostUnavailable,
    /// The content descriptor cannot be served by the active adapter.
    #[error("unsupported popup content: {0}")]
    ContentUnsupported(String),
    /// A host capability failed.
    #[error(transparent)]
    Host(#[from] HostError),
    /// The message channel failed.
    #[error(transparent)]
    Channel(#[from] popup_channel::Error),
    /// Geometry input was invalid.
    #[error(transparent)]
    Geometry(#[from] popup_geom::Error),
    /// Launch parameters could not be read.
    #[error("invalid launch parameters: {0}")]
    Launch(String),
}

impl From<popup_protocol::launch::Error> for Error {
    fn from(e: popup_protocol::launch::Error) -> Self {
        Self::Launch(e.to_string())
    }
}

/// Result alias for popup-core operations.
pub type Result<T> = StdResult<T, Error>;
