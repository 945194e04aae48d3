//! Path lock table
//!
//! Process-local claim registry: a path in the set is owned by exactly one
//! worker until it is explicitly released. This is the only correctness gate
//! against double-handling; the exclusive-open check done later by workers
//! guards against *other processes*, not against our own threads.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Set of absolute paths currently claimed by a worker
///
/// All mutations go through one mutex, so `try_claim` is an atomic
/// test-and-set across discovery triggers, workers, and sweeps.
#[derive(Debug, Default)]
pub struct PathLockTable {
    claimed: Mutex<HashSet<PathBuf>>,
}

impl PathLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to claim a path. Returns true iff this call newly added it.
    pub fn try_claim(&self, path: &Path) -> bool {
        let mut claimed = self.claimed.lock().unwrap();
        claimed.insert(path.to_path_buf())
    }

    /// Release a claim. Idempotent; releasing an unclaimed path is a no-op.
    pub fn release(&self, path: &Path) {
        let mut claimed = self.claimed.lock().unwrap();
        claimed.remove(path);
    }

    /// Advisory check, for diagnostics only. Never use this as a gate:
    /// the answer can be stale by the time the caller acts on it.
    pub fn is_claimed(&self, path: &Path) -> bool {
        let claimed = self.claimed.lock().unwrap();
        claimed.contains(path)
    }

    /// Number of currently claimed paths
    pub fn len(&self) -> usize {
        self.claimed.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
