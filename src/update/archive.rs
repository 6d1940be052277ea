//! Unpacking downloaded zip archives into the staging area.
//!
//! Both functions are blocking and meant for `spawn_blocking`. Entry names are
//! resolved with [`zip::read::ZipFile::enclosed_name`], so an archive can never
//! write outside the destination directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

use crate::core::{Result, UpdateError};
use crate::utils::fs::ensure_dir;

fn archive_error(archive: &Path, reason: impl std::fmt::Display) -> UpdateError {
    UpdateError::Archive {
        archive: archive.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
        reason: reason.to_string(),
    }
}

fn open(archive_path: &Path) -> Result<ZipArchive<fs::File>> {
    let file = fs::File::open(archive_path)?;
    ZipArchive::new(file).map_err(|e| archive_error(archive_path, e))
}

/// File entries of the archive as `(index, enclosed path)`.
fn file_entries(archive_path: &Path, archive: &mut ZipArchive<fs::File>) -> Result<Vec<(usize, PathBuf)>> {
    let mut entries = Vec::new();
    for index in 0..archive.len() {
        let entry = archive.by_index(index).map_err(|e| archive_error(archive_path, e))?;
        if entry.is_dir() {
            continue;
        }
        match entry.enclosed_name() {
            Some(name) => entries.push((index, name)),
            None => {
                return Err(archive_error(
                    archive_path,
                    format!("entry '{}' escapes the archive root", entry.name()),
                ));
            }
        }
    }
    Ok(entries)
}

/// The single top-level directory every entry lives under, if there is one.
fn shared_root(entries: &[(usize, PathBuf)]) -> Option<PathBuf> {
    let mut root: Option<&std::ffi::OsStr> = None;
    for (_, path) in entries {
        let mut components = path.components();
        let first = components.next()?.as_os_str();
        components.next()?;
        match root {
            None => root = Some(first),
            Some(existing) if existing == first => {}
            Some(_) => return None,
        }
    }
    root.map(PathBuf::from)
}

fn write_entry(
    archive_path: &Path,
    archive: &mut ZipArchive<fs::File>,
    index: usize,
    target: &Path,
) -> Result<()> {
    let mut entry = archive.by_index(index).map_err(|e| archive_error(archive_path, e))?;
    if let Some(parent) = target.parent() {
        ensure_dir(parent)?;
    }
    let mut out = fs::File::create(target)?;
    io::copy(&mut entry, &mut out).map_err(|e| archive_error(archive_path, e))?;
    out.sync_all()?;

    #[cfg(unix)]
    if let Some(mode) = entry.unix_mode() {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(target, fs::Permissions::from_mode(mode & 0o777))?;
    }
    Ok(())
}

/// Extract an application bundle into `dest`.
///
/// When every entry sits below one common top-level directory (the usual
/// `YoutubeConverter/...` layout), that directory is stripped. Returns the
/// extracted files relative to `dest`, sorted.
pub fn extract_bundle(archive_path: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let mut archive = open(archive_path)?;
    let entries = file_entries(archive_path, &mut archive)?;
    if entries.is_empty() {
        return Err(archive_error(archive_path, "archive contains no files"));
    }

    let strip = shared_root(&entries);
    ensure_dir(dest)?;

    let mut extracted = Vec::with_capacity(entries.len());
    for (index, path) in entries {
        let relative = match &strip {
            Some(root) => path.strip_prefix(root).map(Path::to_path_buf).unwrap_or(path),
            None => path,
        };
        write_entry(archive_path, &mut archive, index, &dest.join(&relative))?;
        extracted.push(relative);
    }

    extracted.sort();
    debug!(archive = %archive_path.display(), files = extracted.len(), "Extracted bundle");
    Ok(extracted)
}

/// Extract specific executables, flattened into `dest`.
///
/// Each wanted file name is looked up anywhere in the archive; an entry inside a
/// `bin` directory wins over others with the same name. Fails when any of them is
/// missing.
pub fn extract_binaries(archive_path: &Path, dest: &Path, wanted: &[String]) -> Result<Vec<PathBuf>> {
    let mut archive = open(archive_path)?;
    let entries = file_entries(archive_path, &mut archive)?;
    ensure_dir(dest)?;

    let mut extracted = Vec::with_capacity(wanted.len());
    for name in wanted {
        let mut candidates = entries.iter().filter(|(_, path)| {
            path.file_name().is_some_and(|f| f.eq_ignore_ascii_case(name.as_str()))
        });
        let in_bin = candidates.clone().find(|(_, path)| {
            path.parent().and_then(Path::file_name).is_some_and(|d| d.eq_ignore_ascii_case("bin"))
        });
        let Some((index, _)) = in_bin.or_else(|| candidates.next()) else {
            return Err(archive_error(archive_path, format!("missing '{name}'")));
        };

        let target = dest.join(name);
        write_entry(archive_path, &mut archive, *index, &target)?;
        crate::utils::fs::set_executable(&target)?;
        extracted.push(PathBuf::from(name));
    }

    debug!(archive = %archive_path.display(), files = ?extracted, "Extracted binaries");
    Ok(extracted)
}
