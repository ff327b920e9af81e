//! Error types for configuration loading and validation.

use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Errors produced while loading, parsing, or validating a configuration.
pub enum Error {
    #[error("{message}")]
    /// I/O or filesystem read error.
    Read {
        /// Optional path associated with the read error.
        path: Option<PathBuf>,
        /// Human-readable error message.
        message: String,
    },
    #[error("{message}")]
    /// RON parse error with a concrete line/column location and excerpt.
    Parse {
        /// Optional path associated with the parse error.
        path: Option<PathBuf>,
        /// 1-based line number.
        line: usize,
        /// 1-based column number.
        col: usize,
        /// Human-readable error message.
        message: String,
        /// Rendered excerpt including a caret at the error location.
        excerpt: String,
    },
    #[error("{field}: {message}")]
    /// A value parsed but is out of range.
    Validation {
        /// Optional path associated with the validation error.
        path: Option<PathBuf>,
        /// Offending field.
        field: &'static str,
        /// Human-readable error message.
        message: String,
    },
}

impl Error {
    /// Render a human-friendly error message including location and an excerpt when available.
    pub fn pretty(&self) -> String {
        match self {
            Self::Read { path, message } => match path {
                Some(p) => format!("Read error at {}: {}", p.display(), message),
                None => format!("Read error: {}", message),
            },
            Self::Parse {
                path,
                line,
                col,
                message,
                excerpt,
            } => match path {
                Some(p) => format!(
                    "Config parse error at {}:{}:{}\n{}\n{}",
                    p.display(),
                    line,
                    col,
                    message,
                    excerpt
                ),
                None => format!(
                    "Config parse error at line {}, column {}\n{}\n{}",
                    line, col, message, excerpt
                ),
            },
            Self::Validation {
                path,
                field,
                message,
            } => match path {
                Some(p) => format!(
                    "Config validation error at {}\n{}: {}",
                    p.display(),
                    field,
                    message
                ),
                None => format!("Config validation error\n{}: {}", field, message),
            },
        }
    }

    /// Access the optional path attached to this error.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Read { path, .. } | Self::Parse { path, .. } | Self::Validation { path, .. } => {
                path.as_deref()
            }
        }
    }

    /// Attach `path` to an error produced from in-memory text.
    pub(crate) fn with_path(mut self, new: &Path) -> Self {
        match &mut self {
            Self::Read { path, .. } | Self::Parse { path, .. } | Self::Validation { path, .. } => {
                *path = Some(new.to_path_buf());
            }
        }
        self
    }
}

/// Up to two lines of context before `line` plus the line after, with a caret
/// under `col` on the offending line.
pub fn excerpt_at(source: &str, line: usize, col: usize) -> String {
    let first = line.saturating_sub(2).max(1);
    let mut out = String::new();
    for (n, text) in source
        .lines()
        .enumerate()
        .map(|(i, t)| (i + 1, t))
        .skip(first - 1)
        .take_while(|(n, _)| *n <= line + 1)
    {
        let _ignored = writeln!(out, " {n:>4} | {text}");
        if n == line {
            let _ignored = writeln!(out, "{}^", " ".repeat(8 + col.saturating_sub(1)));
        }
    }
    out
}
