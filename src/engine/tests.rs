use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use tempfile::tempdir;

use super::*;
use crate::error::HotfolderError;
use crate::log::MemorySink;
use crate::queue::TaskStatus;

/// What the scripted processor does with each dispatched file
#[derive(Clone, Copy)]
enum Outcome {
    Archive,
    Delete,
    Error,
    Leave,
    Fail,
}

struct ScriptedProcessor {
    outcome: Outcome,
    calls: Mutex<Vec<PathBuf>>,
}

impl ScriptedProcessor {
    fn new(outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }
}

impl Processor for ScriptedProcessor {
    fn handle(&self, path: &Path, _name: &str, ctx: &WatchContext<'_>) -> HotfolderResult<()> {
        self.calls.lock().unwrap().push(path.to_path_buf());
        match self.outcome {
            Outcome::Archive => ctx.mark_as_processed(path),
            Outcome::Delete => ctx.mark_as_deleted(path),
            Outcome::Error => ctx.mark_as_error(path),
            Outcome::Leave => Ok(()),
            Outcome::Fail => Err(HotfolderError::processor(path, "scripted failure")),
        }
    }
}

fn make_engine(
    input: &Path,
    outcome: Outcome,
    tweak: impl FnOnce(&mut WatcherConfig),
) -> (FolderWatchEngine, Arc<ScriptedProcessor>, MemorySink) {
    let mut config = WatcherConfig {
        name: "test".to_string(),
        kind: "tests.ScriptedWatcher".to_string(),
        input_folder: input.to_path_buf(),
        filter: "*.xml".to_string(),
        threads: 2,
        ..WatcherConfig::default()
    };
    tweak(&mut config);

    let processor = ScriptedProcessor::new(outcome);
    let sink = MemorySink::new();
    let engine = FolderWatchEngine::new(
        config,
        input,
        processor.clone(),
        Arc::new(sink.clone()),
    )
    .unwrap();
    (engine, processor, sink)
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    cond()
}

#[test]
fn discover_processes_and_archives() {
    let dir = tempdir().unwrap();
    let (engine, processor, _sink) = make_engine(dir.path(), Outcome::Archive, |_| {});
    let file = dir.path().join("a.xml");
    fs::write(&file, "payload").unwrap();

    let handle = engine.discover(&file).unwrap();
    assert_eq!(handle.wait(), TaskStatus::Completed);

    assert_eq!(processor.calls(), vec![file.clone()]);
    assert!(!file.exists());
    assert!(dir.path().join("processed").join("a.xml").exists());
    assert!(!engine.is_claimed(&file));
}

#[test]
fn discover_ignores_non_matching_names() {
    let dir = tempdir().unwrap();
    let (engine, processor, _sink) = make_engine(dir.path(), Outcome::Archive, |_| {});
    let file = dir.path().join("notes.txt");
    fs::write(&file, "payload").unwrap();

    assert!(engine.discover(&file).is_none());
    assert!(processor.calls().is_empty());
}

#[test]
fn second_discovery_of_claimed_path_is_dropped() {
    let dir = tempdir().unwrap();
    let (engine, processor, sink) = make_engine(dir.path(), Outcome::Leave, |_| {});
    let file = dir.path().join("a.xml");
    fs::write(&file, "payload").unwrap();

    let handle = engine.discover(&file).unwrap();
    assert_eq!(handle.wait(), TaskStatus::Completed);

    // Leave never calls a terminal operation, so the claim is still held
    assert!(engine.is_claimed(&file));
    assert!(engine.discover(&file).is_none());
    assert!(sink.contains("Tried to enqueue already seen file"));
    assert_eq!(processor.calls().len(), 1);
}

#[test]
fn processor_failure_releases_claim_and_leaves_file() {
    let dir = tempdir().unwrap();
    let (engine, _processor, sink) = make_engine(dir.path(), Outcome::Fail, |_| {});
    let file = dir.path().join("a.xml");
    fs::write(&file, "payload").unwrap();

    let handle = engine.discover(&file).unwrap();
    assert_eq!(handle.wait(), TaskStatus::Completed);

    assert!(file.exists());
    assert!(!engine.is_claimed(&file));
    assert!(sink.contains("Failed to handle path"));
}

#[test]
fn vanished_file_releases_claim() {
    let dir = tempdir().unwrap();
    let (engine, processor, sink) = make_engine(dir.path(), Outcome::Archive, |_| {});
    let file = dir.path().join("ghost.xml");

    let handle = engine.discover(&file).unwrap();
    assert_eq!(handle.wait(), TaskStatus::Completed);

    assert!(processor.calls().is_empty());
    assert!(!engine.is_claimed(&file));
    assert!(sink.contains("no longer exists"));
}

#[test]
fn sweep_enqueues_only_unclaimed_matching_files() {
    let dir = tempdir().unwrap();
    let (engine, processor, _sink) = make_engine(dir.path(), Outcome::Archive, |_| {});
    let a = dir.path().join("a.xml");
    let b = dir.path().join("b.xml");
    fs::write(&a, "a").unwrap();
    fs::write(&b, "b").unwrap();
    fs::write(dir.path().join("skip.txt"), "not matched").unwrap();

    // b is already owned by someone else
    assert!(engine.inner.locks.try_claim(&b));

    engine.sweep_now("test sweep");
    assert!(wait_until(Duration::from_secs(2), || !a.exists()));

    assert_eq!(processor.calls(), vec![a]);
    assert!(b.exists());
}

#[test]
fn sweep_is_skipped_while_batch_flag_is_set() {
    let dir = tempdir().unwrap();
    let (engine, processor, _sink) = make_engine(dir.path(), Outcome::Archive, |_| {});
    fs::write(dir.path().join("a.xml"), "a").unwrap();

    engine.inner.in_batch.store(true, Ordering::SeqCst);
    engine.sweep_now("reentrant tick");
    std::thread::sleep(Duration::from_millis(100));

    assert!(processor.calls().is_empty());
    engine.inner.in_batch.store(false, Ordering::SeqCst);
}

#[test]
fn sweep_is_skipped_when_input_folder_guard_is_held() {
    let dir = tempdir().unwrap();
    let (engine, processor, _sink) = make_engine(dir.path(), Outcome::Archive, |_| {});
    fs::write(dir.path().join("a.xml"), "a").unwrap();

    assert!(engine.inner.locks.try_claim(dir.path()));
    engine.sweep_now("concurrent sweep");
    std::thread::sleep(Duration::from_millis(100));

    assert!(processor.calls().is_empty());
}

#[test]
fn mark_as_deleted_moves_to_deleted_folder() {
    let dir = tempdir().unwrap();
    let (engine, _processor, _sink) = make_engine(dir.path(), Outcome::Delete, |_| {});
    let file = dir.path().join("a.xml");
    fs::write(&file, "payload").unwrap();

    let handle = engine.discover(&file).unwrap();
    assert_eq!(handle.wait(), TaskStatus::Completed);

    assert!(!file.exists());
    assert!(dir.path().join("deleted").join("a.xml").exists());
    assert!(!engine.is_claimed(&file));
}

#[test]
fn mark_as_deleted_with_delete_means_delete_removes_permanently() {
    let dir = tempdir().unwrap();
    let (engine, _processor, _sink) = make_engine(dir.path(), Outcome::Delete, |c| {
        c.delete_means_delete = true;
    });
    let file = dir.path().join("a.xml");
    fs::write(&file, "payload").unwrap();

    let handle = engine.discover(&file).unwrap();
    assert_eq!(handle.wait(), TaskStatus::Completed);

    assert!(!file.exists());
    // No deleted folder was ever set up
    assert!(!dir.path().join("deleted").exists());
    assert!(!engine.is_claimed(&file));
}

#[test]
fn mark_as_error_moves_to_error_folder() {
    let dir = tempdir().unwrap();
    let (engine, _processor, _sink) = make_engine(dir.path(), Outcome::Error, |_| {});
    let file = dir.path().join("a.xml");
    fs::write(&file, "payload").unwrap();

    let handle = engine.discover(&file).unwrap();
    assert_eq!(handle.wait(), TaskStatus::Completed);

    assert!(dir.path().join("error").join("a.xml").exists());
    assert!(!engine.is_claimed(&file));
}

#[test]
fn no_default_folders_leaves_processed_file_in_place() {
    let dir = tempdir().unwrap();
    let (engine, _processor, _sink) = make_engine(dir.path(), Outcome::Archive, |c| {
        c.no_default_folders = true;
    });
    let file = dir.path().join("a.xml");
    fs::write(&file, "payload").unwrap();

    let handle = engine.discover(&file).unwrap();
    assert_eq!(handle.wait(), TaskStatus::Completed);

    // mark_as_processed has nowhere to archive to: the file stays, and so
    // does the claim (the documented contract of leave-in-place watchers)
    assert!(file.exists());
    assert!(engine.is_claimed(&file));
}

#[test]
fn missing_input_folder_degrades_instead_of_failing() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope");
    let processor = ScriptedProcessor::new(Outcome::Archive);
    let sink = MemorySink::new();
    let config = WatcherConfig {
        input_folder: missing.clone(),
        ..WatcherConfig::default()
    };

    let engine =
        FolderWatchEngine::new(config, dir.path(), processor, Arc::new(sink.clone())).unwrap();
    engine.start().unwrap();

    assert!(sink.contains("does not exist"));
    // Neither the input folder nor its default aux folders were created
    assert!(!missing.exists());
}

#[test]
fn unset_input_folder_degrades_like_missing() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("stray.xml"), "payload").unwrap();
    let processor = ScriptedProcessor::new(Outcome::Archive);
    let sink = MemorySink::new();

    let engine = FolderWatchEngine::new(
        WatcherConfig::default(),
        dir.path(),
        processor.clone(),
        Arc::new(sink.clone()),
    )
    .unwrap();
    engine.start().unwrap();

    // The base directory is never adopted as a stand-in input folder
    assert!(engine.folders().input_folder.as_os_str().is_empty());
    assert!(sink.contains("does not exist"));
    std::thread::sleep(Duration::from_millis(100));
    assert!(processor.calls().is_empty());
    assert!(dir.path().join("stray.xml").exists());
}

#[test]
fn shutdown_is_idempotent_and_rejects_new_work() {
    let dir = tempdir().unwrap();
    let (engine, _processor, _sink) = make_engine(dir.path(), Outcome::Archive, |_| {});
    let file = dir.path().join("a.xml");
    fs::write(&file, "payload").unwrap();

    engine.shutdown();
    engine.shutdown();

    assert!(engine.discover(&file).is_none());
    assert!(!engine.is_claimed(&file));
}
