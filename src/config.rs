//! Watcher configuration
//!
//! One [`WatcherConfig`] record per watched folder, typically deserialized
//! from the host's configuration file (the loader and its format are the
//! host's business). Resolved once at startup into a set of absolute folder
//! paths; immutable afterwards.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::log::WatcherLog;

/// Per-watcher settings as loaded from configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Display name; falls back to the last segment of `kind` when empty
    pub name: String,

    /// Watcher-kind identifier, e.g. `uploads.InvoiceWatcher`
    pub kind: String,

    /// Folder to watch. Required; must exist before startup.
    pub input_folder: PathBuf,

    /// Separate folder for transformed output, for processors that want one
    pub output_folder: Option<PathBuf>,

    /// Where processed files are archived (default: `processed/` under input)
    pub archive_folder: Option<PathBuf>,

    /// Where "deleted" files go when `delete_means_delete` is off
    /// (default: `deleted/` under input)
    pub deleted_folder: Option<PathBuf>,

    /// Where failed files go (default: `error/` under input)
    pub error_folder: Option<PathBuf>,

    /// Glob matched against file names
    pub filter: String,

    /// Worker thread count; 0 means the default of 4
    pub threads: usize,

    /// Watch the whole subtree instead of just the top level
    pub watch_subfolders: bool,

    /// Seconds between reconciliation sweeps; 0 disables them
    pub cleanup_interval_secs: u64,

    /// Permanently delete instead of moving to the deleted folder
    pub delete_means_delete: bool,

    /// Skip setting up archive/deleted/error folders entirely;
    /// processed files are left in place unless the processor moves them
    pub no_default_folders: bool,

    /// Pass-through settings for concrete processors; never interpreted
    /// by the engine
    pub url: Option<String>,
    pub namespace: Option<String>,
    pub connection_string: Option<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: String::new(),
            input_folder: PathBuf::new(),
            output_folder: None,
            archive_folder: None,
            deleted_folder: None,
            error_folder: None,
            filter: default_filter(),
            threads: default_threads(),
            watch_subfolders: false,
            cleanup_interval_secs: 0,
            delete_means_delete: false,
            no_default_folders: false,
            url: None,
            namespace: None,
            connection_string: None,
        }
    }
}

fn default_filter() -> String {
    "*".to_string()
}

fn default_threads() -> usize {
    4
}

impl WatcherConfig {
    /// Name used for logging: explicit name, or the tail of `kind`
    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            return &self.name;
        }
        match self.kind.rsplit('.').next() {
            Some(tail) if !tail.is_empty() => tail,
            _ => "watcher",
        }
    }

    /// Effective worker count (a configured 0 means the default)
    pub fn worker_count(&self) -> usize {
        if self.threads == 0 {
            default_threads()
        } else {
            self.threads
        }
    }

    /// Resolve relative paths against `base_dir` and apply folder defaults.
    ///
    /// If subtree watching is requested while any auxiliary folder lives
    /// under the input folder, it is forced off: files moved to
    /// `processed/` would otherwise re-trigger discovery forever.
    pub fn resolve(&self, base_dir: &Path, log: &WatcherLog) -> ResolvedFolders {
        // An unset input folder stays empty rather than falling back to
        // `base_dir`: the engine must refuse to watch, not silently process
        // whatever happens to live next to the configuration.
        let input_folder =
            make_rooted(base_dir, Some(self.input_folder.as_path())).unwrap_or_default();

        let (archive_folder, deleted_folder, error_folder) = if self.no_default_folders {
            (None, None, None)
        } else {
            let archive = configured_folder(&input_folder, self.archive_folder.as_deref(), "processed");
            let deleted = if self.delete_means_delete {
                None
            } else {
                Some(configured_folder(&input_folder, self.deleted_folder.as_deref(), "deleted"))
            };
            let error = configured_folder(&input_folder, self.error_folder.as_deref(), "error");
            (Some(archive), deleted, Some(error))
        };

        let output_folder = make_rooted(base_dir, self.output_folder.as_deref());

        let mut watch_subfolders = self.watch_subfolders;
        if watch_subfolders {
            let nested = [&archive_folder, &deleted_folder, &error_folder]
                .into_iter()
                .any(|folder| {
                    folder
                        .as_deref()
                        .is_some_and(|f| f.starts_with(&input_folder))
                });
            if nested {
                watch_subfolders = false;
                log.error(
                    "Will not watch subfolders as some of the configured folders are subfolders of input folder",
                );
            }
        }

        ResolvedFolders {
            input_folder,
            output_folder,
            archive_folder,
            deleted_folder,
            error_folder,
            watch_subfolders,
        }
    }
}

/// Absolute folder layout for one watcher, fixed at startup
#[derive(Debug, Clone)]
pub struct ResolvedFolders {
    pub input_folder: PathBuf,
    pub output_folder: Option<PathBuf>,
    pub archive_folder: Option<PathBuf>,
    pub deleted_folder: Option<PathBuf>,
    pub error_folder: Option<PathBuf>,
    /// May be forced off by the nested-folder invariant
    pub watch_subfolders: bool,
}

/// Root a configured path: absolute paths win, relative ones append to base
fn make_rooted(base: &Path, configured: Option<&Path>) -> Option<PathBuf> {
    let path = configured?;
    if path.as_os_str().is_empty() {
        return None;
    }
    if path.is_absolute() {
        Some(path.to_path_buf())
    } else {
        Some(base.join(path))
    }
}

/// Auxiliary folder: configured override or a named subfolder of input
fn configured_folder(input: &Path, configured: Option<&Path>, default_name: &str) -> PathBuf {
    make_rooted(input, configured).unwrap_or_else(|| input.join(default_name))
}
