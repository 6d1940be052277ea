//! Single-flight guard for update operations.
//!
//! Two layers keep at most one update in flight against an install root:
//! an in-process mutex shared by every clone of the orchestrator, and an OS-level
//! advisory lock on `<root>/.update.lock` for other processes. Neither layer waits:
//! a second caller fails immediately with [`UpdateError::ConcurrentOperation`].
//!
//! File operations run in `spawn_blocking` so the runtime never stalls on slow I/O.

use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::core::{Result, UpdateError};

/// In-process half of the guard; clone it to share between orchestrator handles.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    inner: Arc<Mutex<()>>,
}

impl SingleFlight {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an operation currently holds the guard.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.inner.try_lock().is_err()
    }

    /// Take both the in-process guard and the file lock at `lock_path`, or fail
    /// with `ConcurrentOperation` if either is held.
    pub async fn try_acquire(&self, lock_path: &Path) -> Result<UpdateGuard> {
        let local = Arc::clone(&self.inner)
            .try_lock_owned()
            .map_err(|_| UpdateError::ConcurrentOperation)?;

        let path = lock_path.to_path_buf();
        let file = tokio::task::spawn_blocking(move || open_and_lock(&path))
            .await
            .map_err(|e| UpdateError::State {
                reason: format!("lock task failed: {e}"),
            })??;

        debug!(lock = %lock_path.display(), "Update lock acquired");
        Ok(UpdateGuard {
            _local: local,
            _file: file,
            path: lock_path.to_path_buf(),
        })
    }
}

fn open_and_lock(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).write(true).truncate(false).open(path)?;

    match file.try_lock_exclusive() {
        Ok(true) => Ok(file),
        Ok(false) => Err(UpdateError::ConcurrentOperation),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
            Err(UpdateError::ConcurrentOperation)
        }
        Err(e) => Err(e.into()),
    }
}

/// Held for the duration of one update operation. Released on drop.
///
/// The lock file itself is left in place; removing it while another process has it
/// open would let two processes lock different inodes.
#[derive(Debug)]
pub struct UpdateGuard {
    _local: OwnedMutexGuard<()>,
    _file: File,
    path: PathBuf,
}

impl Drop for UpdateGuard {
    fn drop(&mut self) {
        debug!(lock = %self.path.display(), "Update lock released");
    }
}
