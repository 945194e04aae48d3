//! hotfolder - folder-watch processing engine
//!
//! Watches a drop folder and guarantees every matching file is handed to a
//! pluggable per-file [`Processor`] exactly once at a time, surviving missed
//! filesystem notifications, partial writes, and transient I/O failures.
//! Discovered files are claimed, queued onto a fixed worker pool, verified
//! with an exclusive open, processed, and archived with content-hash
//! conflict resolution.

pub mod config;
pub mod engine;
pub mod error;
pub mod locks;
pub mod log;
pub mod mover;
pub mod queue;
pub mod retry;

// Re-exports for convenience
pub use config::{ResolvedFolders, WatcherConfig};
pub use engine::{FolderWatchEngine, Processor, WatchContext};
pub use error::{HotfolderError, HotfolderResult};
pub use locks::PathLockTable;
pub use log::{LogLevel, LogSink, MemorySink, NullSink, WatcherLog};
pub use queue::{CancelFlag, TaskHandle, TaskStatus, WorkQueue};
