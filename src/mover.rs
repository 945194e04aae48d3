//! Hash-aware file moves
//!
//! Archiving a file into a folder that already holds one with the same name
//! must never overwrite anything. If the existing content is byte-identical
//! the source is simply dropped (dedup); otherwise an ascending " (n)"
//! suffix is probed until a free or identical slot is found.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::HotfolderResult;
use crate::log::WatcherLog;

/// Upper bound for numbered conflict candidates
const MAX_NUMBERED: u32 = 1_000_000;

/// Compute the SHA-256 digest of a file's content, as `sha256:<hex>`
pub fn hash_file(path: &Path) -> HotfolderResult<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("sha256:{:x}", hasher.finalize()))
}

/// Build the n-th conflict candidate: `report.xml` -> `report (3).xml`
fn numbered_candidate(target: &Path, n: u32) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match target.extension() {
        Some(ext) => format!("{} ({}).{}", stem, n, ext.to_string_lossy()),
        None => format!("{} ({})", stem, n),
    };
    match target.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Move `source` to `target` without ever overwriting existing content.
///
/// - Missing source: logged, no-op.
/// - Missing target: plain rename.
/// - Identical content already at the target (or at a numbered candidate):
///   the source is deleted instead of stored twice.
/// - Different content: the first free numbered candidate receives the file.
///
/// Idempotent, so safe to wrap in [`crate::retry::try_five_times`].
pub fn move_file(log: &WatcherLog, source: &Path, target: &Path) -> HotfolderResult<()> {
    if !source.exists() {
        log.debug(format!("MoveFile: File {} does not exist.", source.display()));
        return Ok(());
    }
    if !target.exists() {
        std::fs::rename(source, target)?;
        return Ok(());
    }

    let source_hash = hash_file(source)?;
    if source_hash == hash_file(target)? {
        std::fs::remove_file(source)?;
        return Ok(());
    }

    for n in 1..MAX_NUMBERED {
        let candidate = numbered_candidate(target, n);
        if !candidate.exists() {
            std::fs::rename(source, &candidate)?;
            return Ok(());
        }
        if source_hash == hash_file(&candidate)? {
            std::fs::remove_file(source)?;
            return Ok(());
        }
    }

    Err(io::Error::other(format!(
        "no free candidate name for {}",
        target.display()
    ))
    .into())
}

/// Delete a file if it exists; a missing file is logged and ignored.
pub fn delete_file(log: &WatcherLog, path: &Path) -> HotfolderResult<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    } else {
        log.debug(format!("DeleteFile: File {} does not exist.", path.display()));
    }
    Ok(())
}
