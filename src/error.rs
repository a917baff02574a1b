//! Error types for the variable index
//!
//! Nothing in here is fatal to the server. Source-level failures are turned into
//! "this source contributes nothing" by the coordinator; the variants exist so the
//! failure can be logged with enough context to be useful.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for index operations
#[derive(Error, Debug)]
pub enum IndexError {
    /// IO errors (reading sources, walking the workspace, settings file access)
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON parsing errors (workspace settings)
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// The source identifier does not name a readable file
    #[error("Source not found: {source_id}")]
    SourceNotFound { source_id: String },

    /// A path could not be expressed relative to the workspace root
    #[error("Path is outside the workspace: {path:?}")]
    OutsideWorkspace { path: PathBuf },

    /// File watcher setup failed
    #[error("Watcher setup error: {0}")]
    Watcher(#[from] notify::Error),
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;

impl From<std::io::Error> for IndexError {
    fn from(err: std::io::Error) -> Self {
        IndexError::Io {
            source: err,
            message: "IO operation failed".to_string(),
        }
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::Json {
            source: err,
            message: "JSON operation failed".to_string(),
        }
    }
}

/// Helper trait for converting IO errors with context
pub trait IoContext<T> {
    fn with_io_context(self, message: &str) -> IndexResult<T>;
}

impl<T> IoContext<T> for Result<T, std::io::Error> {
    fn with_io_context(self, message: &str) -> IndexResult<T> {
        self.map_err(|e| IndexError::Io {
            message: message.to_string(),
            source: e,
        })
    }
}

/// Helper trait for converting JSON errors with context
pub trait JsonContext<T> {
    fn with_json_context(self, message: &str) -> IndexResult<T>;
}

impl<T> JsonContext<T> for Result<T, serde_json::Error> {
    fn with_json_context(self, message: &str) -> IndexResult<T> {
        self.map_err(|e| IndexError::Json {
            message: message.to_string(),
            source: e,
        })
    }
}
