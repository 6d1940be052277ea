//! Per-run scratch directory for downloads and unpacked archives.
//!
//! Nothing in the live install tree is touched while an update is being fetched:
//! every byte lands under `<root>/.update-staging/run-*`. The directory lives on
//! the same filesystem as the install tree so the final swap is a rename, and it is
//! removed when the [`StagingArea`] is dropped.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

use super::layout::InstallLayout;
use super::release::Component;
use crate::core::Result;
use crate::utils::fs::{ensure_dir, remove_dir_all};

const RUN_PREFIX: &str = "run-";

/// A private, self-deleting staging directory.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    /// Create a fresh staging directory below the layout's staging parent.
    pub fn create(layout: &InstallLayout) -> Result<Self> {
        let parent = layout.staging_dir();
        ensure_dir(&parent)?;
        let dir = tempfile::Builder::new().prefix(RUN_PREFIX).tempdir_in(&parent)?;
        debug!(path = %dir.path().display(), "Created staging area");
        Ok(Self {
            dir,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where an asset with this file name is downloaded.
    #[must_use]
    pub fn download_path(&self, asset_name: &str) -> PathBuf {
        self.dir.path().join("downloads").join(sanitize(asset_name))
    }

    /// Where the files a component installs are assembled, mirroring the
    /// component's directory in the install tree.
    #[must_use]
    pub fn unpack_dir(&self, component: Component) -> PathBuf {
        self.dir.path().join("unpacked").join(component.as_str())
    }

    /// Remove staging directories abandoned by interrupted runs.
    ///
    /// Only call while holding the update lock.
    pub fn purge_stale(layout: &InstallLayout) {
        let parent = layout.staging_dir();
        let Ok(entries) = std::fs::read_dir(&parent) else {
            return;
        };
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().starts_with(RUN_PREFIX) {
                let path = entry.path();
                match remove_dir_all(&path) {
                    Ok(()) => debug!(path = %path.display(), "Removed stale staging area"),
                    Err(e) => warn!(path = %path.display(), error = %e, "Could not remove stale staging area"),
                }
            }
        }
    }
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '\0') { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "asset".to_string(),
        _ => cleaned,
    }
}
