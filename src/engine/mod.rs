//! Folder watch engine
//!
//! Orchestrates the watch → claim → queue → process → archive pipeline:
//! OS change notifications and reconciliation sweeps both feed discovered
//! paths through the claim table into the worker pool, where the injected
//! [`Processor`] runs and finishes the file through a terminal callback.
//!
//! Discovery is eventually consistent. A missed OS event, a dropped claim
//! race, or a file still being written are all healed by the next sweep
//! (or, with sweeps disabled, by a delayed single re-enqueue).

mod context;
#[cfg(test)]
mod tests;

pub use context::WatchContext;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use globset::{Glob, GlobMatcher};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use rand::Rng;

use crate::config::{ResolvedFolders, WatcherConfig};
use crate::error::{HotfolderError, HotfolderResult};
use crate::locks::PathLockTable;
use crate::log::{LogSink, WatcherLog};
use crate::queue::{TaskHandle, WorkQueue};

/// Granularity of the scan thread's interruptible sleeps
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// The pluggable per-file capability the engine dispatches to.
///
/// `handle` runs on a worker thread while the path is claimed. The contract:
/// call exactly one of the context's terminal operations
/// ([`WatchContext::mark_as_processed`], [`WatchContext::mark_as_deleted`],
/// [`WatchContext::mark_as_error`], [`WatchContext::move_from_queue`])
/// before returning, or the path stays claimed indefinitely. Returning an
/// error releases the claim and leaves the file in place for the next sweep.
pub trait Processor: Send + Sync {
    fn handle(&self, path: &Path, name: &str, ctx: &WatchContext<'_>) -> HotfolderResult<()>;
}

pub(crate) struct EngineInner {
    pub(crate) config: WatcherConfig,
    pub(crate) folders: ResolvedFolders,
    pub(crate) matcher: GlobMatcher,
    pub(crate) locks: PathLockTable,
    pub(crate) in_batch: AtomicBool,
    pub(crate) queue: WorkQueue,
    pub(crate) log: WatcherLog,
    pub(crate) processor: Arc<dyn Processor>,
    pub(crate) stopping: AtomicBool,
}

/// One watched folder: notify subscription, scan thread, worker pool
pub struct FolderWatchEngine {
    inner: Arc<EngineInner>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    scan_thread: Mutex<Option<JoinHandle<()>>>,
}

impl FolderWatchEngine {
    /// Resolve the configuration and prepare the engine.
    ///
    /// Auxiliary folders are created if missing. The input folder is *not*
    /// created: a missing input folder is logged as an error and the engine
    /// stays degraded (no discovery) rather than masking a config typo.
    pub fn new(
        config: WatcherConfig,
        base_dir: &Path,
        processor: Arc<dyn Processor>,
        sink: Arc<dyn LogSink>,
    ) -> HotfolderResult<Self> {
        let log = WatcherLog::new(config.display_name().to_string(), sink);
        let folders = config.resolve(base_dir, &log);
        let matcher = Glob::new(&config.filter)?.compile_matcher();

        // Never create the input folder itself: a typo in the configuration
        // must surface as an error, not as a fresh empty folder. Auxiliary
        // folders are only set up once the input folder is known to exist.
        if folders.input_folder.is_dir() {
            for folder in [
                &folders.archive_folder,
                &folders.deleted_folder,
                &folders.error_folder,
            ]
            .into_iter()
            .flatten()
            {
                std::fs::create_dir_all(folder)?;
            }
        }

        let suffix = if folders.watch_subfolders {
            format!("/*{}", config.filter)
        } else {
            String::new()
        };
        if config.no_default_folders {
            log.info(format!(
                "Registering watcher '{}': input from '{}{}', leave files in place.",
                config.kind,
                folders.input_folder.display(),
                suffix
            ));
        } else {
            log.info(format!(
                "Registering watcher '{}': input from '{}{}', archive to '{}'",
                config.kind,
                folders.input_folder.display(),
                suffix,
                folders
                    .archive_folder
                    .as_deref()
                    .unwrap_or(Path::new(""))
                    .display()
            ));
        }
        if !folders.input_folder.is_dir() {
            let missing = HotfolderError::InputFolderMissing {
                path: folders.input_folder.clone(),
            };
            log.error(format!(
                "{missing}. Please create the folder and restart this service."
            ));
        }
        if let Some(output) = &folders.output_folder {
            log.info(format!("Transformed output will go into '{}'", output.display()));
        }

        let queue = WorkQueue::new(config.worker_count());

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                folders,
                matcher,
                locks: PathLockTable::new(),
                in_batch: AtomicBool::new(false),
                queue,
                log,
                processor,
                stopping: AtomicBool::new(false),
            }),
            watcher: Mutex::new(None),
            scan_thread: Mutex::new(None),
        })
    }

    /// Register the OS watch and spawn the scan coordinator thread.
    ///
    /// With a missing input folder this is a logged no-op and the engine
    /// stays degraded.
    pub fn start(&self) -> HotfolderResult<()> {
        let inner = &self.inner;
        if !inner.folders.input_folder.is_dir() {
            let missing = HotfolderError::InputFolderMissing {
                path: inner.folders.input_folder.clone(),
            };
            inner.log.error(format!("Not starting: {missing}."));
            return Ok(());
        }

        // Notification thread only ever claims and enqueues; all file I/O
        // happens on the worker that dequeues the task.
        let events = Arc::clone(inner);
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Create(_)) {
                        for path in event.paths {
                            if events.matches(&path) {
                                let name = display_name_of(&path);
                                discover(&events, path, name);
                            }
                        }
                    }
                }
                Err(err) => events.log.error(format!("Watch error: {err}")),
            },
            NotifyConfig::default(),
        )?;
        let mode = if inner.folders.watch_subfolders {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(&inner.folders.input_folder, mode)?;
        *self.watcher.lock().unwrap() = Some(watcher);

        // One coordinating loop: randomized-delay initial sweep, then
        // periodic sweeps with a skip-if-busy check. No timer reentrancy.
        let first_delay: u64 = rand::thread_rng().gen_range(5..20);
        inner.log.info(format!(
            "Initial folder scan to clean up any existing files will happen in {} seconds.",
            first_delay
        ));
        let interval = inner.config.cleanup_interval_secs;
        if interval > 0 {
            inner.log.info(format!(
                "Regular clean-up scans will occur every {} seconds.",
                interval
            ));
        } else {
            inner.log.info("Regular clean-up scans are disabled.");
        }

        let scans = Arc::clone(inner);
        let handle = std::thread::Builder::new()
            .name(format!("{}-scan", inner.config.display_name()))
            .spawn(move || {
                if !sleep_while_running(&scans, Duration::from_secs(first_delay)) {
                    return;
                }
                sweep(&scans, "Initial scan.");
                if interval == 0 {
                    return;
                }
                while sleep_while_running(&scans, Duration::from_secs(interval)) {
                    sweep(&scans, "Periodic folder scan");
                }
            })?;
        *self.scan_thread.lock().unwrap() = Some(handle);

        Ok(())
    }

    /// Hand a known path to the engine, as an OS event would.
    ///
    /// Returns the completion handle of the enqueued task, or `None` when
    /// the path does not match the filter or is already claimed.
    pub fn discover(&self, path: &Path) -> Option<TaskHandle> {
        if !self.inner.matches(path) {
            return None;
        }
        let name = display_name_of(path);
        discover(&self.inner, path.to_path_buf(), name)
    }

    /// Run one reconciliation sweep right now (skipped while another sweep
    /// is in progress).
    pub fn sweep_now(&self, reason: &str) {
        sweep(&self.inner, reason);
    }

    /// Advisory claim check, for diagnostics and tests
    pub fn is_claimed(&self, path: &Path) -> bool {
        self.inner.locks.is_claimed(path)
    }

    /// Resolved folder layout for this watcher
    pub fn folders(&self) -> &ResolvedFolders {
        &self.inner.folders
    }

    /// Tasks enqueued but not yet picked up
    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    /// Stop discovery, drain in-flight work, and release OS resources.
    /// Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        if self.inner.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner
            .log
            .debug(format!("Stopping {}", self.inner.config.display_name()));
        self.watcher.lock().unwrap().take();
        if let Some(handle) = self.scan_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.inner.queue.shutdown();
    }
}

impl Drop for FolderWatchEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl EngineInner {
    fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| self.matcher.is_match(Path::new(name)))
            .unwrap_or(false)
    }
}

fn display_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Claim a discovered path and enqueue its worker task.
///
/// Losing the claim means another trigger already owns the path; the
/// discovery is dropped and logged.
fn discover(inner: &Arc<EngineInner>, path: PathBuf, name: String) -> Option<TaskHandle> {
    if !inner.locks.try_claim(&path) {
        inner.log.error(format!(
            "Tried to enqueue already seen file: {}",
            path.display()
        ));
        return None;
    }

    let worker = Arc::clone(inner);
    let task_path = path.clone();
    match inner.queue.enqueue(move || {
        handle_claimed(&worker, &task_path, &name);
        Ok(())
    }) {
        Ok(handle) => Some(handle),
        Err(err) => {
            inner.locks.release(&path);
            inner.log.error(format!(
                "Could not enqueue {}: {}",
                path.display(),
                err
            ));
            None
        }
    }
}

/// Worker-side dispatch for a claimed path.
fn handle_claimed(inner: &Arc<EngineInner>, path: &Path, name: &str) {
    if !path.is_file() {
        inner
            .log
            .debug(format!("The file {} no longer exists.", path.display()));
        inner.locks.release(path);
        return;
    }

    if !confirm_exclusive(path) {
        // Still being written by the producer, or open in another process
        inner.locks.release(path);
        inner.log.debug(format!(
            "Could not acquire exclusive lock on file: {}",
            path.display()
        ));
        if inner.config.cleanup_interval_secs == 0 && !inner.stopping.load(Ordering::SeqCst) {
            // No periodic healer; push the path to the back of the queue
            std::thread::sleep(Duration::from_secs(1));
            inner.log.debug(format!("Re-queueing file {}", path.display()));
            discover(inner, path.to_path_buf(), name.to_string());
        }
        return;
    }

    inner.log.debug(format!("Processing file: {}", path.display()));
    let ctx = WatchContext::new(inner);
    if let Err(err) = inner.processor.handle(path, name, &ctx) {
        // File stays in place for a later sweep to retry
        inner.locks.release(path);
        inner.log.error(format!(
            "Failed to handle path {}: {}",
            path.display(),
            err
        ));
    }
}

/// Confirm nobody else is still writing the file: open it and take (then
/// immediately drop) an OS-level exclusive lock.
fn confirm_exclusive(path: &Path) -> bool {
    match File::open(path) {
        Ok(file) => {
            if fs2::FileExt::try_lock_exclusive(&file).is_ok() {
                let _ = fs2::FileExt::unlock(&file);
                true
            } else {
                false
            }
        }
        Err(_) => false,
    }
}

/// One reconciliation sweep: non-recursive enumeration of the input folder,
/// enqueuing every matching unclaimed file. The input folder path itself is
/// claimed as the sweep guard, and the batch flag keeps a periodic tick from
/// re-entering while a sweep is still running.
fn sweep(inner: &Arc<EngineInner>, reason: &str) {
    if inner.in_batch.load(Ordering::SeqCst) {
        return;
    }
    if !inner.locks.try_claim(&inner.folders.input_folder) {
        return;
    }
    inner.in_batch.store(true, Ordering::SeqCst);

    inner.log.debug(format!(
        "{} ({}/{})",
        reason,
        inner.folders.input_folder.display(),
        inner.config.filter
    ));

    match std::fs::read_dir(&inner.folders.input_folder) {
        Ok(entries) => {
            let mut enqueued = 0;
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() || !inner.matches(&path) {
                    continue;
                }
                if inner.locks.is_claimed(&path) {
                    continue;
                }
                let name = display_name_of(&path);
                if discover(inner, path, name).is_some() {
                    enqueued += 1;
                }
            }
            inner.log.debug(format!(
                "{} - enqueued {} files (queue depth {})",
                reason,
                enqueued,
                inner.queue.len()
            ));
        }
        Err(err) => {
            inner
                .log
                .error(format!("Exception processing files. ERROR: {}", err));
        }
    }

    inner.in_batch.store(false, Ordering::SeqCst);
    inner.locks.release(&inner.folders.input_folder);
}

/// Sleep in small slices so shutdown stays prompt.
/// Returns false when the engine is stopping.
fn sleep_while_running(inner: &EngineInner, total: Duration) -> bool {
    let deadline = std::time::Instant::now() + total;
    while std::time::Instant::now() < deadline {
        if inner.stopping.load(Ordering::SeqCst) {
            return false;
        }
        std::thread::sleep(SLEEP_SLICE.min(
            deadline.saturating_duration_since(std::time::Instant::now()),
        ));
    }
    !inner.stopping.load(Ordering::SeqCst)
}
