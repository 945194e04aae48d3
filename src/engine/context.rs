//! Post-processing context handed to the processor
//!
//! The four terminal operations here are the only legal ways to finish a
//! claimed file. Every move/delete goes through the retry executor so that
//! transient sharing violations self-heal.

use std::path::Path;

use super::EngineInner;
use crate::error::HotfolderResult;
use crate::log::WatcherLog;
use crate::mover;
use crate::retry::try_five_times;

/// Callback context for one dispatched file.
///
/// Exposes the terminal operations plus the routing settings the engine
/// carries on behalf of concrete processors (output folder, url, ...).
pub struct WatchContext<'a> {
    inner: &'a EngineInner,
}

impl<'a> WatchContext<'a> {
    pub(super) fn new(inner: &'a EngineInner) -> Self {
        Self { inner }
    }

    /// Archive the file and release its claim.
    ///
    /// No-op when no archive folder is configured (`no_default_folders`);
    /// the file then stays in place and stays claimed, matching the
    /// leave-in-place contract of such watchers.
    pub fn mark_as_processed(&self, path: &Path) -> HotfolderResult<()> {
        if let Some(archive) = self.inner.folders.archive_folder.as_deref() {
            self.move_and_release(path, archive)?;
        }
        Ok(())
    }

    /// Dispose of the file: permanent delete when `delete_means_delete`,
    /// otherwise a move to the deleted folder. Always releases the claim.
    pub fn mark_as_deleted(&self, path: &Path) -> HotfolderResult<()> {
        let log = &self.inner.log;
        if self.inner.config.delete_means_delete {
            try_five_times(log, "DeleteFile", || mover::delete_file(log, path))?;
        } else if let Some(deleted) = self.inner.folders.deleted_folder.as_deref() {
            self.move_keeping_name(path, deleted)?;
        }
        self.inner.locks.release(path);
        Ok(())
    }

    /// Move the file to the error folder and release its claim.
    /// No-op when no error folder is configured.
    pub fn mark_as_error(&self, path: &Path) -> HotfolderResult<()> {
        if let Some(error_folder) = self.inner.folders.error_folder.as_deref() {
            self.move_and_release(path, error_folder)?;
        }
        Ok(())
    }

    /// Move the file to an arbitrary folder, keeping its name, and release
    /// its claim.
    pub fn move_from_queue(&self, target_folder: &Path, path: &Path) -> HotfolderResult<()> {
        self.move_and_release(path, target_folder)
    }

    /// Configured output folder for transformed results, if any
    pub fn output_folder(&self) -> Option<&Path> {
        self.inner.folders.output_folder.as_deref()
    }

    /// Pass-through endpoint URL from the watcher configuration
    pub fn url(&self) -> Option<&str> {
        self.inner.config.url.as_deref()
    }

    /// Pass-through namespace from the watcher configuration
    pub fn namespace(&self) -> Option<&str> {
        self.inner.config.namespace.as_deref()
    }

    /// Pass-through connection string from the watcher configuration
    pub fn connection_string(&self) -> Option<&str> {
        self.inner.config.connection_string.as_deref()
    }

    /// The engine's logger, for processors that want shared diagnostics
    pub fn log(&self) -> &WatcherLog {
        &self.inner.log
    }

    fn move_and_release(&self, path: &Path, folder: &Path) -> HotfolderResult<()> {
        self.move_keeping_name(path, folder)?;
        self.inner.locks.release(path);
        Ok(())
    }

    fn move_keeping_name(&self, path: &Path, folder: &Path) -> HotfolderResult<()> {
        let log = &self.inner.log;
        let Some(file_name) = path.file_name() else {
            log.debug(format!("MoveFile: {} has no file name.", path.display()));
            return Ok(());
        };
        let target = folder.join(file_name);
        try_five_times(log, "MoveFile", || mover::move_file(log, path, &target))
    }
}
