//! Error types for the book indexer.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, BookIndexError>;

/// Errors that can occur while converting or indexing a document.
///
/// Partial resolution is not an error: unresolved sections, a missing
/// calibration anchor or a failed fallback call end up as diagnostics
/// inside the built index instead.
#[derive(Error, Debug)]
pub enum BookIndexError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The source document does not exist.
    #[error("Document not found at '{0}'")]
    DocumentNotFound(PathBuf),

    /// The input could not be interpreted as a page-structured document.
    #[error("Invalid input document: {0}")]
    InvalidInput(String),

    /// No markdown file could be located for a document folder.
    #[error("No markdown file found under '{0}'")]
    MarkdownNotFound(PathBuf),

    /// The index file does not exist.
    #[error("Index file not found at '{0}'")]
    IndexNotFound(PathBuf),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// LLM API error.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// LLM response parsing error.
    #[error("Failed to parse LLM response: {0}")]
    LlmParse(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The fallback collaborator did not answer in time.
    #[error("Fallback timed out after {0}s")]
    FallbackTimeout(u64),
}

impl BookIndexError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for BookIndexError {
    fn from(err: reqwest::Error) -> Self {
        BookIndexError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for BookIndexError {
    fn from(err: serde_json::Error) -> Self {
        BookIndexError::LlmParse(err.to_string())
    }
}
