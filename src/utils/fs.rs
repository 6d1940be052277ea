//! File system helpers for the install tree.
//!
//! Everything here is synchronous and returns `std::io::Result`; callers in async
//! code run these inside `tokio::task::spawn_blocking`.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Create a directory and all of its parents if they don't exist.
pub fn ensure_dir(path: &Path) -> io::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    } else if !path.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("Path exists but is not a directory: {}", path.display()),
        ));
    }
    Ok(())
}

/// Temporary sibling path used while replacing `path`.
///
/// The name is unique per call so concurrent writers in one directory never collide.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
}

/// Atomically writes bytes to a file using a write-then-rename strategy.
///
/// The content is written to a temporary file in the same directory, synced to
/// disk, and renamed over the target, so readers see either the old or the new
/// content and never a partial write.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let temp_path = temp_sibling(path);
    let result = (|| {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result?;
    sync_parent(path);
    Ok(())
}

/// Atomically replace `target` with a copy of `source`.
///
/// The copy lands under a temporary name next to the target, is synced, takes
/// over `source`'s permissions, and is renamed into place.
pub fn atomic_replace(source: &Path, target: &Path) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        ensure_dir(parent)?;
    }

    let temp_path = temp_sibling(target);
    let result = (|| {
        fs::copy(source, &temp_path)?;
        let file = fs::OpenOptions::new().write(true).open(&temp_path)?;
        file.sync_all()?;
        drop(file);
        fs::set_permissions(&temp_path, fs::metadata(source)?.permissions())?;
        fs::rename(&temp_path, target)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result?;
    sync_parent(target);
    Ok(())
}

/// Copy a file preserving permissions, syncing the destination.
pub fn copy_synced(source: &Path, target: &Path) -> io::Result<u64> {
    if let Some(parent) = target.parent() {
        ensure_dir(parent)?;
    }
    let copied = fs::copy(source, target)?;
    fs::OpenOptions::new().write(true).open(target)?.sync_all()?;
    Ok(copied)
}

#[cfg(unix)]
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}

/// Remove a directory tree; a missing directory is not an error.
pub fn remove_dir_all(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Remove a file; a missing file is not an error.
pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// All regular files below `root`, as paths relative to it, sorted.
pub fn list_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        if entry.file_type().is_file() {
            if let Ok(relative) = entry.path().strip_prefix(root) {
                files.push(relative.to_path_buf());
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Mark a file executable for everyone who can read it.
#[cfg(unix)]
pub fn set_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
pub fn set_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Whether a file has any execute bit set. Always true off unix.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path).map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}
