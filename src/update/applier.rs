//! Swapping staged files into the live install tree.
//!
//! A [`CommitUnit`] holds one or more staged components that succeed or fail
//! together. Each component moves through
//!
//! ```text
//! Staged ──► Validated ──► Swapped ──► Committed
//!                │             │
//!                └─────────────┴──► RolledBack
//! ```
//!
//! - **Validated**: every staged file is present; tool executables are non-empty
//!   and executable. A rollback journal is opened.
//! - **Swapped**: each live file is backed up into the journal, then replaced with a
//!   temp-file-and-rename in its own directory. The running executable is staged as
//!   `<exe>.new` instead.
//! - **Committed**: the [`VersionStore`] is saved, and only afterwards the journal is
//!   deleted.
//!
//! Any failure after the journal is opened restores every swapped file and leaves
//! the installed state alone. A process that dies mid-swap leaves its journal
//! behind; [`Applier::recover`] finishes the job on the next run.
//!
//! All of this is blocking filesystem work; async callers run it in
//! `spawn_blocking`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::layout::InstallLayout;
use super::release::{Component, ReleaseDescriptor};
use super::rollback::{JournalTarget, RollbackSet};
use super::self_replace::{is_own_executable, pending_path, stage_own_executable};
use super::state::VersionStore;
use crate::core::{Result, UpdateError};
use crate::utils::fs::{atomic_replace, is_executable, list_files};

/// Where a component is in the apply state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentPhase {
    Staged,
    Validated,
    Swapped,
    Committed,
    RolledBack,
}

impl fmt::Display for ComponentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Staged => "staged",
            Self::Validated => "validated",
            Self::Swapped => "swapped",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
        })
    }
}

/// A component whose files are laid out in a staging directory, mirroring its
/// install directory.
#[derive(Debug, Clone)]
pub struct StagedComponent {
    pub component: Component,
    pub release: ReleaseDescriptor,
    pub source_dir: PathBuf,
}

/// Components committed all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct CommitUnit {
    pub components: Vec<StagedComponent>,
}

impl CommitUnit {
    #[must_use]
    pub fn single(staged: StagedComponent) -> Self {
        Self {
            components: vec![staged],
        }
    }

    #[must_use]
    pub fn component_names(&self) -> Vec<Component> {
        self.components.iter().map(|c| c.component).collect()
    }
}

/// The running executable was replaced on disk and the process should restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaunchRequest {
    pub executable: PathBuf,
    pub pending: PathBuf,
}

/// What a successful [`Applier::apply`] changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    /// Components and the versions they now have.
    pub committed: Vec<(Component, String)>,
    pub files_replaced: usize,
    pub relaunch: Option<RelaunchRequest>,
}

/// Points in [`Applier::apply`] where a fault hook is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// The journal is open and nothing was swapped yet.
    Validated,
    /// The n-th file (zero based) was just swapped.
    FileSwapped(usize),
    /// Every file is swapped; the state is about to be saved.
    BeforeCommit,
    /// The state was saved; the journal is about to be deleted.
    Committed,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validated => f.write_str("validated"),
            Self::FileSwapped(n) => write!(f, "file {n} swapped"),
            Self::BeforeCommit => f.write_str("before commit"),
            Self::Committed => f.write_str("committed"),
        }
    }
}

/// What a fault hook asks the applier to do at a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAction {
    Continue,
    /// Fail as if an I/O error occurred; the normal rollback runs.
    Fail,
    /// Stop dead, leaving the disk as a killed process would.
    Crash,
}

pub type FaultHook = Arc<dyn Fn(Checkpoint) -> FaultAction + Send + Sync>;

/// Result of [`Applier::recover`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Interrupted swaps that were rolled back.
    pub restored: usize,
    /// Journals of swaps that had committed; only the backups were removed.
    pub discarded: usize,
}

struct FilePlan {
    component: Component,
    source: PathBuf,
    target: PathBuf,
}

/// Applies commit units to an install tree.
#[derive(Clone)]
pub struct Applier {
    layout: InstallLayout,
    store: Arc<dyn VersionStore>,
    own_executable: Option<PathBuf>,
    fault: Option<FaultHook>,
}

impl Applier {
    /// The running executable is detected from `std::env::current_exe`.
    pub fn new(layout: InstallLayout, store: Arc<dyn VersionStore>) -> Self {
        Self {
            layout,
            store,
            own_executable: std::env::current_exe().ok(),
            fault: None,
        }
    }

    /// Treat `path` as this process's executable.
    #[must_use]
    pub fn with_own_executable(mut self, path: Option<PathBuf>) -> Self {
        self.own_executable = path;
        self
    }

    #[cfg(any(test, feature = "test-utils"))]
    #[must_use]
    pub fn with_fault_hook(mut self, hook: FaultHook) -> Self {
        self.fault = Some(hook);
        self
    }

    #[must_use]
    pub const fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    fn checkpoint(&self, point: Checkpoint) -> FaultAction {
        self.fault.as_ref().map_or(FaultAction::Continue, |hook| hook(point))
    }

    /// Validate, swap, and commit a unit.
    pub fn apply(&self, unit: &CommitUnit) -> Result<CommitResult> {
        let Some(first) = unit.components.first() else {
            return Ok(CommitResult {
                committed: Vec::new(),
                files_replaced: 0,
                relaunch: None,
            });
        };
        let lead = first.component;

        let plan = self.validate(unit)?;
        for staged in &unit.components {
            info!(component = %staged.component, version = %staged.release.version, phase = %ComponentPhase::Validated, "Component validated");
        }

        let targets = unit
            .components
            .iter()
            .map(|c| JournalTarget {
                component: c.component,
                version: c.release.version.clone(),
            })
            .collect();
        let mut rollback = RollbackSet::begin(&self.layout, targets)
            .map_err(|e| UpdateError::apply(lead, ComponentPhase::Validated, e))?;

        match self.checkpoint(Checkpoint::Validated) {
            FaultAction::Continue => {}
            FaultAction::Fail => {
                return Err(self.roll_back(rollback, lead, ComponentPhase::Validated, "injected fault"));
            }
            FaultAction::Crash => return Err(crashed(lead, Checkpoint::Validated)),
        }

        let mut relaunch = None;
        for (index, file) in plan.iter().enumerate() {
            let swapped = if is_own_executable(&file.target, self.own_executable.as_deref()) {
                self.defer_own_executable(&mut rollback, file).map(|request| relaunch = Some(request))
            } else {
                self.swap_file(&mut rollback, file)
            };
            if let Err(e) = swapped {
                return Err(self.roll_back(rollback, file.component, ComponentPhase::Validated, e));
            }

            let point = Checkpoint::FileSwapped(index);
            match self.checkpoint(point) {
                FaultAction::Continue => {}
                FaultAction::Fail => {
                    return Err(self.roll_back(rollback, file.component, ComponentPhase::Validated, "injected fault"));
                }
                FaultAction::Crash => return Err(crashed(file.component, point)),
            }
        }
        for staged in &unit.components {
            debug!(component = %staged.component, phase = %ComponentPhase::Swapped, "Component swapped");
        }

        match self.checkpoint(Checkpoint::BeforeCommit) {
            FaultAction::Continue => {}
            FaultAction::Fail => {
                return Err(self.roll_back(rollback, lead, ComponentPhase::Swapped, "injected fault"));
            }
            FaultAction::Crash => return Err(crashed(lead, Checkpoint::BeforeCommit)),
        }

        if let Err(e) = self.commit(unit) {
            return Err(self.roll_back(rollback, lead, ComponentPhase::Swapped, e));
        }
        for staged in &unit.components {
            info!(component = %staged.component, version = %staged.release.version, phase = %ComponentPhase::Committed, "Component committed");
        }

        if self.checkpoint(Checkpoint::Committed) == FaultAction::Crash {
            return Err(crashed(lead, Checkpoint::Committed));
        }
        if let Err(e) = rollback.discard() {
            warn!(error = %e, "Committed, but the rollback backup could not be removed");
        }

        Ok(CommitResult {
            committed: unit
                .components
                .iter()
                .map(|c| (c.component, c.release.version.clone()))
                .collect(),
            files_replaced: plan.len(),
            relaunch,
        })
    }

    /// Check a unit's staged files and work out which live files they replace.
    fn validate(&self, unit: &CommitUnit) -> Result<Vec<FilePlan>> {
        let mut plan = Vec::new();

        for staged in &unit.components {
            let component = staged.component;
            let fail = |reason: String| UpdateError::apply(component, ComponentPhase::Staged, reason);

            let files = list_files(&staged.source_dir).map_err(|e| fail(e.to_string()))?;
            if files.is_empty() {
                return Err(fail("no files were staged".to_string()));
            }

            let install_dir = self.layout.component_dir(component);
            for required in self.layout.required_executables(component) {
                let Some(name) = required.file_name() else {
                    continue;
                };
                let source = staged.source_dir.join(name);
                let len = std::fs::metadata(&source).map(|m| m.len()).unwrap_or(0);
                if len == 0 {
                    return Err(fail(format!("staged '{}' is missing or empty", name.to_string_lossy())));
                }
                if !is_executable(&source) {
                    return Err(fail(format!("staged '{}' is not executable", name.to_string_lossy())));
                }
            }

            for relative in files {
                if component == Component::Application && self.layout.is_protected(&relative) {
                    warn!(path = %relative.display(), "Bundle file would overwrite a protected path; skipped");
                    continue;
                }
                plan.push(FilePlan {
                    component,
                    source: staged.source_dir.join(&relative),
                    target: install_dir.join(&relative),
                });
            }
        }

        Ok(plan)
    }

    fn swap_file(&self, rollback: &mut RollbackSet, file: &FilePlan) -> std::io::Result<()> {
        if let Some(parent) = file.target.parent() {
            let missing: Vec<&Path> = parent
                .ancestors()
                .take_while(|dir| *dir != self.layout.root() && !dir.exists())
                .collect();
            for dir in missing.into_iter().rev() {
                rollback.record_dir(dir)?;
                std::fs::create_dir(dir)?;
            }
        }
        rollback.backup(&file.target)?;
        atomic_replace(&file.source, &file.target)
    }

    fn defer_own_executable(&self, rollback: &mut RollbackSet, file: &FilePlan) -> std::io::Result<RelaunchRequest> {
        let pending = pending_path(&file.target);
        rollback.record_deferred(&pending)?;
        let pending = stage_own_executable(&file.source, &file.target)?;
        Ok(RelaunchRequest {
            executable: file.target.clone(),
            pending,
        })
    }

    fn commit(&self, unit: &CommitUnit) -> Result<()> {
        let now = Utc::now();
        let mut state = self.store.load()?;
        for staged in &unit.components {
            state.mark_installed(staged.component, &staged.release, now);
        }
        self.store.save(&state)
    }

    fn roll_back(
        &self,
        rollback: RollbackSet,
        component: Component,
        phase: ComponentPhase,
        cause: impl fmt::Display,
    ) -> UpdateError {
        let mut reason = cause.to_string();
        match rollback.restore() {
            Ok(()) => {
                warn!(%component, %phase, reason = %reason, next = %ComponentPhase::RolledBack, "Apply failed; rolled back");
            }
            Err(e) => {
                warn!(%component, error = %e, "Rollback incomplete; journal kept for recovery");
                reason.push_str(&format!("; rollback incomplete ({e}), run 'ytconv recover'"));
            }
        }
        UpdateError::apply(component, phase, reason)
    }

    /// Settle journals left behind by an interrupted process.
    ///
    /// A journal whose target versions are all recorded in the installed state (and
    /// were recorded after the journal was opened) belongs to a committed swap; its
    /// backups are removed. Every other journal is rolled back.
    pub fn recover(&self) -> Result<RecoveryReport> {
        let pending = RollbackSet::pending(&self.layout)?;
        if pending.is_empty() {
            return Ok(RecoveryReport::default());
        }

        let state = self.store.load()?;
        let mut report = RecoveryReport::default();
        for set in pending {
            let committed = !set.targets().is_empty()
                && set.targets().iter().all(|target| {
                    let record = state.record(target.component);
                    record.version.as_deref() == Some(target.version.as_str())
                        && record.updated_at.is_some_and(|at| at >= set.created_at())
                });

            let lead = set.targets().first().map_or(Component::Application, |t| t.component);
            if committed {
                set.discard()?;
                report.discarded += 1;
            } else {
                info!(journal = %set.dir().display(), files = set.len(), "Rolling back interrupted update");
                set.restore().map_err(|e| UpdateError::apply(lead, ComponentPhase::RolledBack, e))?;
                report.restored += 1;
            }
        }
        Ok(report)
    }
}

fn crashed(component: Component, point: Checkpoint) -> UpdateError {
    UpdateError::apply(component, ComponentPhase::Swapped, format!("interrupted at checkpoint '{point}'"))
}
