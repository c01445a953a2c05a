//! Error types for cultureseg.
//!
//! Library crates use [`SegmenterError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all cultureseg operations.
#[derive(Debug, thiserror::Error)]
pub enum SegmenterError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Malformed structured input (rules file, persisted row, etc.).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The document loader has no reader for this file type.
    #[error("unsupported file type '{extension}' for {path:?}")]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// Failure raised by an enrichment or language-detection collaborator.
    #[error("enrichment error: {0}")]
    Enrichment(String),

    /// Repo storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Report or export writer error.
    #[error("export error: {0}")]
    Export(String),

    /// A batch worker died before reporting a result.
    #[error("worker error: {0}")]
    Worker(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SegmenterError>;

impl SegmenterError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build an unsupported-format error for `path`.
    pub fn unsupported(path: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            path: path.into(),
            extension: extension.into(),
        }
    }
}
