//! Replacing the executable that is currently running.
//!
//! A running binary is never overwritten in place (Windows refuses, and a half
//! written image would crash the process on unix). The new image is staged as
//! `<exe>.new`; once the old process has exited, [`complete_pending`] moves it
//! over the original.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::constants::PENDING_EXE_SUFFIX;
use crate::utils::fs::{atomic_replace, remove_file_if_exists, set_executable};

/// Suffix of the image moved aside while completing a swap on Windows.
const RETIRED_EXE_SUFFIX: &str = "old";

/// `exe` with `.{suffix}` appended to its full file name.
fn with_suffix(exe: &Path, suffix: &str) -> PathBuf {
    let mut name = exe.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    exe.with_file_name(name)
}

/// Where the replacement for `exe` is staged.
#[must_use]
pub fn pending_path(exe: &Path) -> PathBuf {
    with_suffix(exe, PENDING_EXE_SUFFIX)
}

/// Where the previous image of `exe` is moved aside.
#[must_use]
pub fn retired_path(exe: &Path) -> PathBuf {
    with_suffix(exe, RETIRED_EXE_SUFFIX)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Whether `path` is the executable of this process.
#[must_use]
pub fn is_running_executable(path: &Path) -> bool {
    std::env::current_exe().is_ok_and(|exe| same_file(&exe, path))
}

/// Whether `path` refers to `own_exe` (when known).
#[must_use]
pub fn is_own_executable(path: &Path, own_exe: Option<&Path>) -> bool {
    own_exe.is_some_and(|exe| same_file(exe, path) || exe == path)
}

/// Stage `source` as the pending replacement of `exe` and return its path.
pub fn stage_own_executable(source: &Path, exe: &Path) -> io::Result<PathBuf> {
    let pending = pending_path(exe);
    atomic_replace(source, &pending)?;
    set_executable(&pending)?;
    info!(pending = %pending.display(), "Staged replacement for the running executable");
    Ok(pending)
}

/// Move a staged `<exe>.new` over `exe`. Returns whether there was one.
///
/// On Windows the old image is first renamed aside to `<exe>.old`, which is
/// removed on the next run.
pub fn complete_pending(exe: &Path) -> io::Result<bool> {
    let old = retired_path(exe);
    if let Err(e) = remove_file_if_exists(&old) {
        debug!(path = %old.display(), error = %e, "Could not remove retired executable");
    }

    let pending = pending_path(exe);
    if !pending.is_file() {
        return Ok(false);
    }

    if cfg!(windows) && exe.exists() {
        fs::rename(exe, &old)?;
    }
    fs::rename(&pending, exe)?;
    debug!(exe = %exe.display(), "Completed pending executable swap");
    Ok(true)
}
