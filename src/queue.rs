//! Bounded worker pool over a shared task queue
//!
//! A fixed number of worker threads consume from one channel. Each task runs
//! exactly once on exactly one worker; there is no ordering guarantee across
//! workers. Task failures (and panics) are captured into the completion
//! handle and never terminate a worker thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::{HotfolderError, HotfolderResult};

/// Outcome of an enqueued task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Not yet picked up or still running
    Pending,
    Completed,
    Failed(String),
    /// Cancellation flag was set before the task was dequeued
    Canceled,
}

#[derive(Default)]
struct HandleState {
    status: Mutex<TaskStatus>,
    done: Condvar,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Pending
    }
}

impl HandleState {
    fn resolve(&self, status: TaskStatus) {
        let mut current = self.status.lock().unwrap();
        *current = status;
        self.done.notify_all();
    }
}

/// Completion handle for an enqueued task
#[derive(Clone)]
pub struct TaskHandle {
    state: Arc<HandleState>,
}

impl TaskHandle {
    /// Current status without blocking
    pub fn status(&self) -> TaskStatus {
        self.state.status.lock().unwrap().clone()
    }

    /// Block until the task resolves
    pub fn wait(&self) -> TaskStatus {
        let mut status = self.state.status.lock().unwrap();
        while *status == TaskStatus::Pending {
            status = self.state.done.wait(status).unwrap();
        }
        status.clone()
    }

    /// Block until the task resolves or the timeout elapses.
    /// Returns `None` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<TaskStatus> {
        let deadline = std::time::Instant::now() + timeout;
        let mut status = self.state.status.lock().unwrap();
        while *status == TaskStatus::Pending {
            let remaining = deadline.checked_duration_since(std::time::Instant::now())?;
            let (guard, result) = self.state.done.wait_timeout(status, remaining).unwrap();
            status = guard;
            if result.timed_out() && *status == TaskStatus::Pending {
                return None;
            }
        }
        Some(status.clone())
    }
}

/// Cooperative cancellation flag, checked when a task is dequeued
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type Job = Box<dyn FnOnce() -> HotfolderResult<()> + Send + 'static>;

struct WorkItem {
    job: Job,
    cancel: Option<CancelFlag>,
    handle: Arc<HandleState>,
}

/// Fixed-size worker pool consuming one shared queue
pub struct WorkQueue {
    sender: Mutex<Option<Sender<WorkItem>>>,
    depth: Arc<AtomicUsize>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkQueue {
    /// Spawn `worker_count` consumer threads (at least one).
    pub fn new(worker_count: usize) -> Self {
        let (tx, rx) = channel::<WorkItem>();
        let rx = Arc::new(Mutex::new(rx));
        let depth = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::new();
        for _ in 0..worker_count.max(1) {
            let rx = rx.clone();
            let depth = depth.clone();
            workers.push(std::thread::spawn(move || consume(&rx, &depth)));
        }

        Self {
            sender: Mutex::new(Some(tx)),
            depth,
            workers: Mutex::new(workers),
        }
    }

    /// Enqueue a task; the handle resolves when a worker has run it.
    pub fn enqueue<F>(&self, job: F) -> HotfolderResult<TaskHandle>
    where
        F: FnOnce() -> HotfolderResult<()> + Send + 'static,
    {
        self.submit(Box::new(job), None)
    }

    /// Enqueue a task carrying a cancellation flag. If the flag is set
    /// before the task is dequeued, it resolves as `Canceled` without
    /// running.
    pub fn enqueue_cancellable<F>(&self, job: F, cancel: CancelFlag) -> HotfolderResult<TaskHandle>
    where
        F: FnOnce() -> HotfolderResult<()> + Send + 'static,
    {
        self.submit(Box::new(job), Some(cancel))
    }

    fn submit(&self, job: Job, cancel: Option<CancelFlag>) -> HotfolderResult<TaskHandle> {
        let state = Arc::new(HandleState::default());
        let item = WorkItem {
            job,
            cancel,
            handle: state.clone(),
        };

        let sender = self.sender.lock().unwrap();
        match sender.as_ref() {
            Some(tx) => {
                self.depth.fetch_add(1, Ordering::SeqCst);
                tx.send(item).map_err(|_| HotfolderError::QueueClosed)?;
                Ok(TaskHandle { state })
            }
            None => Err(HotfolderError::QueueClosed),
        }
    }

    /// Number of tasks enqueued but not yet picked up by a worker
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting tasks, drain the queue, and join all workers.
    /// Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        // Dropping the sender disconnects the channel once drained
        self.sender.lock().unwrap().take();
        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        for worker in workers {
            let _ = worker.join();
        }
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn consume(rx: &Arc<Mutex<Receiver<WorkItem>>>, depth: &AtomicUsize) {
    loop {
        // Hold the receiver lock only for the dequeue itself
        let item = match rx.lock().unwrap().recv() {
            Ok(item) => item,
            Err(_) => break, // sender dropped and queue drained
        };
        depth.fetch_sub(1, Ordering::SeqCst);

        if item.cancel.as_ref().is_some_and(CancelFlag::is_canceled) {
            item.handle.resolve(TaskStatus::Canceled);
            continue;
        }

        match catch_unwind(AssertUnwindSafe(item.job)) {
            Ok(Ok(())) => item.handle.resolve(TaskStatus::Completed),
            Ok(Err(err)) => item.handle.resolve(TaskStatus::Failed(err.to_string())),
            Err(_) => item.handle.resolve(TaskStatus::Failed("task panicked".to_string())),
        }
    }
}
