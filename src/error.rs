//! Error types for hotfolder
//!
//! Uses `thiserror` for library errors; everything propagates as
//! `HotfolderResult` and nothing at this layer terminates the process.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for hotfolder operations
pub type HotfolderResult<T> = Result<T, HotfolderError>;

/// Main error type for hotfolder operations
#[derive(Error, Debug)]
pub enum HotfolderError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Filesystem watcher registration or delivery error
    #[error("watch error: {0}")]
    Notify(#[from] notify::Error),

    /// Invalid filter glob in the watcher configuration
    #[error("invalid filter pattern: {0}")]
    Pattern(#[from] globset::Error),

    /// Input folder missing (or not configured) at startup
    #[error("Input folder {path} does not exist")]
    InputFolderMissing { path: PathBuf },

    /// A retried file operation failed on every attempt
    #[error("operation '{name}' failed after {attempts} attempts: {source}")]
    RetryExhausted {
        name: &'static str,
        attempts: u32,
        #[source]
        source: Box<HotfolderError>,
    },

    /// Task submitted after the work queue was shut down
    #[error("work queue is shut down")]
    QueueClosed,

    /// Error raised by the external per-file processor
    #[error("processor failed for {path}: {message}")]
    Processor { path: PathBuf, message: String },
}

impl HotfolderError {
    /// Wrap an arbitrary processor failure for a given path.
    pub fn processor(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        HotfolderError::Processor {
            path: path.into(),
            message: message.into(),
        }
    }
}
