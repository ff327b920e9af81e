//! Error handling for the popup-tester crate.

use std::{io, result};

use thiserror::Error;

/// Convenient result type for popup-tester operations.
pub type Result<T> = result::Result<T, Error>;

/// Errors that can occur while running the tester.
#[derive(Debug, Error)]
pub enum Error {
    /// Wrapper for standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Configuration loading or validation errors.
    #[error("Configuration error: {0}")]
    Config(#[from] popup_config::Error),
    /// Arguments were well-formed but describe an impossible layout.
    #[error("Invalid input: {0}")]
    Invalid(String),
    /// Output could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
