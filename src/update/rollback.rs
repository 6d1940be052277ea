//! Rollback journals for in-progress swaps.
//!
//! Before a live file is replaced, a copy of it is placed in
//! `<root>/.update-rollback/<id>/files/` and the replacement is recorded in
//! `<root>/.update-rollback/<id>/journal.json`. The journal is rewritten before every
//! swap, so after a crash it lists every path that may have changed. Restoring walks
//! the entries in reverse: backed-up files are copied back, files that did not exist
//! before are removed.
//!
//! A journal also records which component versions the swap was installing. Recovery
//! compares them with the installed state to tell a committed swap (whose backups are
//! just leftovers) from an interrupted one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::layout::InstallLayout;
use super::release::Component;
use crate::core::{Result, UpdateError};
use crate::utils::fs::{atomic_replace, atomic_write, copy_synced, ensure_dir, remove_dir_all, remove_file_if_exists};

const JOURNAL_FILE: &str = "journal.json";

/// One component version a journal was installing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalTarget {
    pub component: Component,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JournalEntry {
    /// Live path, relative to the install root.
    target: PathBuf,
    /// Copy of the previous file, relative to the journal directory.
    backup: Option<PathBuf>,
    /// Staged next to the running executable rather than swapped in place.
    #[serde(default)]
    deferred: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Journal {
    created_at: DateTime<Utc>,
    targets: Vec<JournalTarget>,
    entries: Vec<JournalEntry>,
    /// Directories created by the swap, relative to the install root.
    #[serde(default)]
    created_dirs: Vec<PathBuf>,
}

/// Backups and journal for one commit unit.
#[derive(Debug)]
pub struct RollbackSet {
    root: PathBuf,
    dir: PathBuf,
    journal: Journal,
}

impl RollbackSet {
    /// Start a journal for a swap installing `targets`.
    pub fn begin(layout: &InstallLayout, targets: Vec<JournalTarget>) -> Result<Self> {
        let dir = layout.rollback_dir().join(uuid::Uuid::new_v4().simple().to_string());
        ensure_dir(&dir.join("files"))?;

        let set = Self {
            root: layout.root().to_path_buf(),
            dir,
            journal: Journal {
                created_at: Utc::now(),
                targets,
                entries: Vec::new(),
                created_dirs: Vec::new(),
            },
        };
        set.persist()?;
        debug!(journal = %set.dir.display(), "Started rollback journal");
        Ok(set)
    }

    /// Journals left behind by runs that did not finish cleaning up.
    pub fn pending(layout: &InstallLayout) -> Result<Vec<Self>> {
        let parent = layout.rollback_dir();
        let entries = match fs::read_dir(&parent) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sets = Vec::new();
        for entry in entries.flatten() {
            let dir = entry.path();
            let journal_path = dir.join(JOURNAL_FILE);
            let content = match fs::read(&journal_path) {
                Ok(content) => content,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    // Crashed before the first journal write; nothing was swapped.
                    remove_dir_all(&dir)?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let journal: Journal = serde_json::from_slice(&content).map_err(|e| UpdateError::State {
                reason: format!("rollback journal {} is not valid: {e}", journal_path.display()),
            })?;
            sets.push(Self {
                root: layout.root().to_path_buf(),
                dir,
                journal,
            });
        }
        sets.sort_by_key(|s| s.journal.created_at);
        Ok(sets)
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.journal.created_at
    }

    #[must_use]
    pub fn targets(&self) -> &[JournalTarget] {
        &self.journal.targets
    }

    /// Number of live paths recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.journal.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.journal.entries.is_empty()
    }

    fn persist(&self) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(&self.journal).map_err(io::Error::other)?;
        atomic_write(&self.dir.join(JOURNAL_FILE), &json)
    }

    fn relative<'a>(&self, path: &'a Path) -> io::Result<&'a Path> {
        path.strip_prefix(&self.root).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is outside the install root", path.display()),
            )
        })
    }

    /// Back up `target` (if it exists) and journal it. Call before replacing it.
    pub fn backup(&mut self, target: &Path) -> io::Result<()> {
        let relative = self.relative(target)?.to_path_buf();
        if self.journal.entries.iter().any(|e| e.target == relative) {
            return Ok(());
        }

        let backup = if target.is_file() {
            let name = PathBuf::from("files").join(self.journal.entries.len().to_string());
            copy_synced(target, &self.dir.join(&name))?;
            fs::set_permissions(self.dir.join(&name), fs::metadata(target)?.permissions())?;
            Some(name)
        } else {
            None
        };

        self.journal.entries.push(JournalEntry {
            target: relative,
            backup,
            deferred: false,
        });
        self.persist()
    }

    /// Journal a file that is written next to the running executable. Rolling back
    /// removes it; the live executable is never touched.
    pub fn record_deferred(&mut self, pending: &Path) -> io::Result<()> {
        let relative = self.relative(pending)?.to_path_buf();
        self.journal.entries.push(JournalEntry {
            target: relative,
            backup: None,
            deferred: true,
        });
        self.persist()
    }

    /// Journal a directory about to be created, so a rollback can remove it again.
    pub fn record_dir(&mut self, dir: &Path) -> io::Result<()> {
        if dir.exists() {
            return Ok(());
        }
        let relative = self.relative(dir)?.to_path_buf();
        self.journal.created_dirs.push(relative);
        self.persist()
    }

    /// Put every journaled path back the way it was, then delete the journal.
    ///
    /// All entries are attempted; on failure the journal is kept so a later
    /// recovery can try again, and the first error is returned.
    pub fn restore(self) -> io::Result<()> {
        let mut first_error = None;

        for entry in self.journal.entries.iter().rev() {
            let target = self.root.join(&entry.target);
            let result = match &entry.backup {
                Some(backup) => atomic_replace(&self.dir.join(backup), &target),
                None => remove_file_if_exists(&target),
            };
            match result {
                Ok(()) => debug!(path = %entry.target.display(), deferred = entry.deferred, "Restored"),
                Err(e) => {
                    warn!(path = %target.display(), error = %e, "Failed to restore file");
                    first_error.get_or_insert(e);
                }
            }
        }

        for dir in self.journal.created_dirs.iter().rev() {
            // Only removes the directory when the rollback emptied it.
            let _ = fs::remove_dir(self.root.join(dir));
        }

        if let Some(error) = first_error {
            return Err(error);
        }
        info!(files = self.journal.entries.len(), "Rolled back swapped files");
        remove_dir_all(&self.dir)
    }

    /// Drop the backups after a successful commit.
    pub fn discard(self) -> io::Result<()> {
        remove_dir_all(&self.dir)?;
        debug!(journal = %self.dir.display(), "Discarded rollback journal");
        Ok(())
    }
}
