//! Retry executor for idempotent file operations
//!
//! Moves and deletes hit transient sharing violations all the time when
//! producers (or virus scanners) still hold the file. Every such operation
//! is retried up to five times with a growing sleep; the last failure
//! propagates to the caller.

use std::thread;
use std::time::Duration;

use crate::error::{HotfolderError, HotfolderResult};
use crate::log::WatcherLog;

/// Maximum attempts for a retried operation
pub const MAX_ATTEMPTS: u32 = 5;

/// Sleep before retry `attempt` (0-based): 100, 300, 500, 700 ms
fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(100 + u64::from(attempt) * 200)
}

/// Execute a named idempotent operation, retrying on failure.
///
/// Failures on attempts 1..4 are logged at debug level and retried after a
/// backoff sleep on the calling thread. The fifth failure is wrapped in
/// [`HotfolderError::RetryExhausted`] and returned.
pub fn try_five_times<F>(log: &WatcherLog, name: &'static str, mut op: F) -> HotfolderResult<()>
where
    F: FnMut() -> HotfolderResult<()>,
{
    let mut attempt = 0;
    loop {
        match op() {
            Ok(()) => return Ok(()),
            Err(err) => {
                log.debug(format!("Operation {} failed {}. time", name, attempt + 1));
                if attempt + 1 >= MAX_ATTEMPTS {
                    return Err(HotfolderError::RetryExhausted {
                        name,
                        attempts: MAX_ATTEMPTS,
                        source: Box::new(err),
                    });
                }
                thread::sleep(backoff(attempt));
                attempt += 1;
            }
        }
    }
}
