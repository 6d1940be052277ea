//! The check-and-apply pipeline.
//!
//! ```text
//! resolve ──► compare ──► confirm? ──► fetch (concurrent) ──► unpack ──► apply
//! ```
//!
//! The application and each tool are separate timelines inside one
//! [`UpdatePlan`]. Tools shipped inside the application's release commit together
//! with it; standalone tool updates commit on their own, so a failing tool never
//! blocks the application (and vice versa).
//!
//! One operation at a time: [`UpdateOrchestrator::check_and_apply`],
//! [`UpdateOrchestrator::downgrade_to`], and [`UpdateOrchestrator::recover`] take the
//! single-flight guard and fail fast with [`UpdateError::ConcurrentOperation`] when it
//! is held. Cancellation is honoured until the first commit starts.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::applier::{Applier, CommitUnit, ComponentPhase, RecoveryReport, RelaunchRequest, StagedComponent};
use super::archive::{extract_binaries, extract_bundle};
use super::channel::{Channel, ToolBranch};
use super::comparator::{Eligibility, UpdateComparator};
use super::fetcher::{Fetcher, StagedAsset};
use super::layout::InstallLayout;
use super::lock::SingleFlight;
use super::plan::{ComponentAction, ResolveFailure, UpdatePlan};
use super::release::{AssetDescriptor, Component, ReleaseDescriptor};
use super::resolver::ChannelResolver;
use super::staging::StagingArea;
use super::state::{ComponentRecord, InstalledState, VersionStore};
use super::tools::{clear_ytdlp_cache, query_version};
use crate::constants::{DEFAULT_APP_REPO, DEFAULT_FFMPEG_REPO};
use crate::core::{Result, UpdateError};
use crate::utils::executable_name;
use crate::utils::fs::{copy_synced, ensure_dir, set_executable};

/// Repositories the components are published from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSources {
    pub app_repo: String,
    pub ffmpeg_repo: String,
}

impl Default for UpdateSources {
    fn default() -> Self {
        Self {
            app_repo: DEFAULT_APP_REPO.to_string(),
            ffmpeg_repo: DEFAULT_FFMPEG_REPO.to_string(),
        }
    }
}

/// Parameters of one check-and-apply run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRequest {
    pub channel: Channel,
    /// Apply without asking the [`UpdatePrompt`].
    pub auto_confirm: bool,
    pub application: bool,
    pub tools: bool,
    pub ytdlp_branch: ToolBranch,
}

impl UpdateRequest {
    /// Application and tools on `channel`, asking before applying.
    #[must_use]
    pub const fn new(channel: Channel) -> Self {
        Self {
            channel,
            auto_confirm: false,
            application: true,
            tools: true,
            ytdlp_branch: ToolBranch::Stable,
        }
    }

    #[must_use]
    pub const fn auto_confirm(mut self, yes: bool) -> Self {
        self.auto_confirm = yes;
        self
    }

    #[must_use]
    pub const fn with_tools(mut self, tools: bool) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub const fn tools_only(mut self) -> Self {
        self.application = false;
        self.tools = true;
        self
    }

    #[must_use]
    pub const fn ytdlp_branch(mut self, branch: ToolBranch) -> Self {
        self.ytdlp_branch = branch;
        self
    }
}

/// Asks whether a plan should be applied.
pub trait UpdatePrompt: Send + Sync {
    fn confirm(&self, plan: &UpdatePlan) -> bool;
}

/// Declines every plan. Used for check-only runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclineAll;

impl UpdatePrompt for DeclineAll {
    fn confirm(&self, _plan: &UpdatePlan) -> bool {
        false
    }
}

/// Why a run, or one of its components, failed.
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub component: Option<Component>,
    /// Version that was being installed.
    pub version: Option<String>,
    pub error: UpdateError,
}

impl FailureReport {
    fn new(component: Option<Component>, version: Option<String>, error: UpdateError) -> Self {
        let report = Self {
            component,
            version,
            error,
        };
        error!(
            component = %report.component.map_or("update", |c| c.as_str()),
            version = %report.version.as_deref().unwrap_or("-"),
            error_kind = report.error.kind(),
            error = %report.error,
            "Update failed"
        );
        report
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.component, &self.version) {
            (Some(component), Some(version)) => write!(f, "{component} {version}: {}", self.error),
            (Some(component), None) => write!(f, "{component}: {}", self.error),
            _ => write!(f, "{}", self.error),
        }
    }
}

/// What was committed by a run.
#[derive(Debug, Clone)]
pub struct AppliedUpdate {
    /// New application version, when the application itself was updated.
    pub version: Option<String>,
    pub components: Vec<(Component, String)>,
    pub relaunch: Option<RelaunchRequest>,
    /// Independent parts of the run that failed.
    pub failures: Vec<FailureReport>,
}

/// Result of [`UpdateOrchestrator::check_and_apply`].
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    UpToDate,
    Applied(AppliedUpdate),
    /// An update was found and the prompt turned it down.
    Declined(UpdatePlan),
    Failed(FailureReport),
}

impl UpdateOutcome {
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Components fetched, staged, and committed together.
struct PendingUnit {
    lead: Component,
    release: ReleaseDescriptor,
    assets: Vec<AssetDescriptor>,
    /// Channel recorded for yt-dlp when it ships inside this unit.
    ytdlp_channel: Channel,
}

/// Drives resolve, compare, fetch, and apply for one install root.
#[derive(Clone)]
pub struct UpdateOrchestrator {
    layout: InstallLayout,
    store: Arc<dyn VersionStore>,
    resolver: ChannelResolver,
    fetcher: Fetcher,
    applier: Applier,
    sources: UpdateSources,
    flight: SingleFlight,
}

impl UpdateOrchestrator {
    pub fn new(
        layout: InstallLayout,
        store: Arc<dyn VersionStore>,
        resolver: ChannelResolver,
        fetcher: Fetcher,
        sources: UpdateSources,
    ) -> Self {
        let applier = Applier::new(layout.clone(), Arc::clone(&store));
        Self {
            layout,
            store,
            resolver,
            fetcher,
            applier,
            sources,
            flight: SingleFlight::new(),
        }
    }

    /// Replace the applier, e.g. to set the running executable or a fault hook.
    #[must_use]
    pub fn with_applier(mut self, applier: Applier) -> Self {
        self.applier = applier;
        self
    }

    #[must_use]
    pub const fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    /// The installed state, with tool versions read from their binaries when the
    /// record has none. Probed versions are not saved.
    pub async fn installed_state(&self) -> Result<InstalledState> {
        let mut state = self.store.load()?;
        for component in [Component::YtDlp, Component::Ffmpeg] {
            if state.record(component).is_installed() {
                continue;
            }
            let binary = match component {
                Component::YtDlp => self.layout.ytdlp_path(),
                _ => self.layout.ffmpeg_path(),
            };
            if let Some(version) = query_version(component, &binary).await {
                debug!(%component, %version, "Seeded tool version from binary");
                *state.record_mut(component) = ComponentRecord::seeded(version);
            }
        }
        Ok(state)
    }

    /// Resolve and compare without changing anything.
    #[instrument(skip(self), fields(channel = %request.channel))]
    pub async fn check(&self, request: &UpdateRequest) -> Result<UpdatePlan> {
        let state = self.installed_state().await?;
        self.plan(request, &state).await
    }

    async fn plan(&self, request: &UpdateRequest, state: &InstalledState) -> Result<UpdatePlan> {
        let mut plan = UpdatePlan::default();

        let app_lookup = async {
            if request.application {
                Some(self.resolver.resolve(&self.sources.app_repo, Component::Application, request.channel).await)
            } else {
                None
            }
        };
        let ytdlp_lookup = async {
            if request.tools {
                Some(self.resolver.resolve_ytdlp(request.ytdlp_branch).await)
            } else {
                None
            }
        };
        let ffmpeg_lookup = async {
            if request.tools {
                Some(self.resolver.resolve(&self.sources.ffmpeg_repo, Component::Ffmpeg, Channel::Release).await)
            } else {
                None
            }
        };
        let (app, ytdlp, ffmpeg) = tokio::join!(app_lookup, ytdlp_lookup, ffmpeg_lookup);

        let mut bundled_in_app = Vec::new();
        match app {
            Some(Ok(candidate)) => {
                let eligibility = UpdateComparator::evaluate(&state.application, &candidate);
                let bundled: Vec<Component> =
                    candidate.components().into_iter().filter(Component::is_tool).collect();
                if eligibility.is_eligible() {
                    bundled_in_app.clone_from(&bundled);
                }
                plan.actions.push(ComponentAction {
                    component: Component::Application,
                    installed: state.application.version.clone(),
                    candidate,
                    eligibility,
                    bundled,
                });
            }
            Some(Err(UpdateError::NotFound {
                subject,
            })) => info!(%subject, "No application release for channel"),
            Some(Err(e)) => return Err(e),
            None => {}
        }

        for (component, lookup) in [(Component::YtDlp, ytdlp), (Component::Ffmpeg, ffmpeg)] {
            match lookup {
                Some(Ok(candidate)) => {
                    let record = state.record(component);
                    let eligibility = if bundled_in_app.contains(&component) {
                        debug!(%component, "Tool is bundled with the application update");
                        Eligibility::Same
                    } else {
                        UpdateComparator::evaluate(record, &candidate)
                    };
                    plan.actions.push(ComponentAction {
                        component,
                        installed: record.version.clone(),
                        candidate,
                        eligibility,
                        bundled: Vec::new(),
                    });
                }
                Some(Err(UpdateError::NotFound {
                    subject,
                })) => info!(%component, %subject, "No tool release found"),
                Some(Err(error)) => {
                    warn!(%component, error_kind = error.kind(), %error, "Tool lookup failed");
                    plan.failures.push(ResolveFailure {
                        component,
                        error,
                    });
                }
                None => {}
            }
        }

        for action in &plan.actions {
            debug!(component = %action.component, eligibility = %action.eligibility, candidate = %action.candidate.version, "Compared");
        }
        Ok(plan)
    }

    /// Resolve, compare, confirm, fetch, and apply.
    #[instrument(skip(self, prompt, cancel), fields(channel = %request.channel))]
    pub async fn check_and_apply(
        &self,
        request: &UpdateRequest,
        prompt: &dyn UpdatePrompt,
        cancel: &CancellationToken,
    ) -> UpdateOutcome {
        let _guard = match self.lock().await {
            Ok(guard) => guard,
            Err(e) => return UpdateOutcome::Failed(FailureReport::new(None, None, e)),
        };

        let state = match self.prepare().await {
            Ok(state) => state,
            Err(e) => return UpdateOutcome::Failed(FailureReport::new(None, None, e)),
        };
        let plan = match self.plan(request, &state).await {
            Ok(plan) => plan,
            Err(e) => {
                return UpdateOutcome::Failed(FailureReport::new(Some(Component::Application), None, e));
            }
        };

        let resolve_failures: Vec<FailureReport> = plan
            .failures
            .iter()
            .map(|f| FailureReport::new(Some(f.component), None, f.error.clone()))
            .collect();

        if !plan.has_updates() {
            return match resolve_failures.into_iter().next() {
                Some(failure) => UpdateOutcome::Failed(failure),
                None => {
                    info!("Everything is up to date");
                    UpdateOutcome::UpToDate
                }
            };
        }

        if !request.auto_confirm && !prompt.confirm(&plan) {
            info!("Update declined");
            return UpdateOutcome::Declined(plan);
        }

        let actions: Vec<ComponentAction> = plan.eligible().cloned().collect();
        self.execute(actions, resolve_failures, request.ytdlp_branch.channel(), cancel).await
    }

    /// Install an exact application version, older ones included.
    #[instrument(skip(self, prompt, cancel))]
    pub async fn downgrade_to(
        &self,
        version: &str,
        auto_confirm: bool,
        prompt: &dyn UpdatePrompt,
        cancel: &CancellationToken,
    ) -> UpdateOutcome {
        let _guard = match self.lock().await {
            Ok(guard) => guard,
            Err(e) => return UpdateOutcome::Failed(FailureReport::new(None, None, e)),
        };
        let state = match self.prepare().await {
            Ok(state) => state,
            Err(e) => return UpdateOutcome::Failed(FailureReport::new(None, None, e)),
        };

        let candidate = match self
            .resolver
            .resolve_version(&self.sources.app_repo, Component::Application, version)
            .await
        {
            Ok(candidate) => candidate,
            Err(e) => {
                return UpdateOutcome::Failed(FailureReport::new(
                    Some(Component::Application),
                    Some(version.to_string()),
                    e,
                ));
            }
        };

        let eligibility = UpdateComparator::evaluate(&state.application, &candidate);
        if eligibility == Eligibility::Same {
            return UpdateOutcome::UpToDate;
        }
        if UpdateComparator::is_downgrade(&state.application, &candidate.version) {
            warn!(from = ?state.application.version, to = %candidate.version, "Explicit downgrade requested");
        }

        let action = ComponentAction {
            component: Component::Application,
            installed: state.application.version.clone(),
            bundled: candidate.components().into_iter().filter(Component::is_tool).collect(),
            candidate,
            eligibility,
        };
        let plan = UpdatePlan {
            actions: vec![action.clone()],
            failures: Vec::new(),
        };
        if !auto_confirm && !prompt.confirm(&plan) {
            return UpdateOutcome::Declined(plan);
        }

        // A bundled yt-dlp stays on whatever branch timeline it is already on
        let ytdlp_channel = state.yt_dlp.channel.unwrap_or_else(|| ToolBranch::default().channel());
        self.execute(vec![action], Vec::new(), ytdlp_channel, cancel).await
    }

    /// Roll back interrupted swaps and remove abandoned staging areas.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let _guard = self.lock().await?;
        self.recover_locked().await
    }

    async fn lock(&self) -> Result<super::lock::UpdateGuard> {
        ensure_dir(self.layout.root())?;
        self.flight.try_acquire(&self.layout.lock_file()).await
    }

    async fn recover_locked(&self) -> Result<RecoveryReport> {
        let applier = self.applier.clone();
        let layout = self.layout.clone();
        let report = tokio::task::spawn_blocking(move || {
            StagingArea::purge_stale(&layout);
            applier.recover()
        })
        .await
        .map_err(|e| UpdateError::State {
            reason: format!("recovery task failed: {e}"),
        })??;

        if report.restored > 0 {
            warn!(restored = report.restored, "Rolled back an interrupted update");
        }
        Ok(report)
    }

    /// Settle leftovers of earlier runs, then read the installed state.
    async fn prepare(&self) -> Result<InstalledState> {
        self.recover_locked().await?;
        self.installed_state().await
    }

    async fn execute(
        &self,
        actions: Vec<ComponentAction>,
        mut failures: Vec<FailureReport>,
        ytdlp_channel: Channel,
        cancel: &CancellationToken,
    ) -> UpdateOutcome {
        if cancel.is_cancelled() {
            return UpdateOutcome::Failed(FailureReport::new(None, None, UpdateError::Cancelled));
        }

        let staging = match StagingArea::create(&self.layout) {
            Ok(staging) => staging,
            Err(e) => return UpdateOutcome::Failed(FailureReport::new(None, None, e)),
        };

        let units: Vec<PendingUnit> = actions
            .into_iter()
            .map(|action| {
                let mut assets: Vec<AssetDescriptor> =
                    action.candidate.assets_for(action.component).take(1).cloned().collect();
                for tool in &action.bundled {
                    assets.extend(action.candidate.assets_for(*tool).take(1).cloned());
                }
                PendingUnit {
                    lead: action.component,
                    release: action.candidate,
                    assets,
                    ytdlp_channel,
                }
            })
            .collect();

        let all_assets: Vec<AssetDescriptor> = units.iter().flat_map(|u| u.assets.iter().cloned()).collect();
        info!(assets = all_assets.len(), "Fetching update assets");
        let mut fetched = self.fetcher.fetch_all(&all_assets, &staging, cancel).await.into_iter();

        let mut ready = Vec::new();
        for unit in units {
            let results: Vec<Result<StagedAsset>> = fetched.by_ref().take(unit.assets.len()).collect();
            if unit.assets.is_empty() {
                failures.push(FailureReport::new(
                    Some(unit.lead),
                    Some(unit.release.version.clone()),
                    UpdateError::not_found(format!("{} asset in release {}", unit.lead, unit.release.tag)),
                ));
                continue;
            }
            let staged: Result<Vec<StagedAsset>> = results.into_iter().collect();
            match staged {
                Ok(staged) => match self.stage_unit(&unit, staged, &staging).await {
                    Ok(commit) => ready.push((unit, commit)),
                    Err(e) => failures.push(FailureReport::new(Some(unit.lead), Some(unit.release.version.clone()), e)),
                },
                Err(e) => failures.push(FailureReport::new(Some(unit.lead), Some(unit.release.version.clone()), e)),
            }
        }

        if cancel.is_cancelled() {
            return UpdateOutcome::Failed(FailureReport::new(None, None, UpdateError::Cancelled));
        }

        // From here on cancellation is no longer observed.
        let mut committed = Vec::new();
        let mut relaunch = None;
        for (unit, commit) in ready {
            let applier = self.applier.clone();
            let lead = unit.lead;
            let applied = tokio::task::spawn_blocking(move || applier.apply(&commit))
                .await
                .map_err(|e| UpdateError::apply(lead, ComponentPhase::Staged, e))
                .and_then(|r| r);

            match applied {
                Ok(result) => {
                    if result.committed.iter().any(|(c, _)| *c == Component::YtDlp) {
                        clear_ytdlp_cache(&self.layout.ytdlp_path()).await;
                    }
                    if result.relaunch.is_some() {
                        relaunch = result.relaunch;
                    }
                    committed.extend(result.committed);
                }
                Err(e) => failures.push(FailureReport::new(Some(lead), Some(unit.release.version.clone()), e)),
            }
        }
        drop(staging);

        if committed.is_empty() {
            // Application failures take precedence in the report.
            failures.sort_by_key(|f| f.component != Some(Component::Application));
            return match failures.into_iter().next() {
                Some(failure) => UpdateOutcome::Failed(failure),
                None => UpdateOutcome::UpToDate,
            };
        }

        let version = committed
            .iter()
            .find(|(c, _)| *c == Component::Application)
            .map(|(_, v)| v.clone());
        for (component, version) in &committed {
            info!(%component, %version, "Update applied");
        }
        UpdateOutcome::Applied(AppliedUpdate {
            version,
            components: committed,
            relaunch,
            failures,
        })
    }

    /// Unpack a unit's downloads into staging directories laid out like the
    /// install tree.
    async fn stage_unit(
        &self,
        unit: &PendingUnit,
        staged: Vec<StagedAsset>,
        staging: &StagingArea,
    ) -> Result<CommitUnit> {
        let mut commit = CommitUnit::default();
        for asset in staged {
            let component = asset.asset.component;
            let dest = staging.unpack_dir(component);
            let download = asset.path.clone();
            let descriptor = asset.asset.clone();
            let unpack_dest = dest.clone();

            tokio::task::spawn_blocking(move || unpack(component, &descriptor, &download, &unpack_dest))
                .await
                .map_err(|e| UpdateError::apply(component, ComponentPhase::Staged, e))??;

            let release = if component == unit.lead {
                unit.release.clone()
            } else {
                let channel = match component {
                    Component::YtDlp => unit.ytdlp_channel,
                    _ => Channel::Release,
                };
                bundled_release(component, &unit.release, channel, &dest).await
            };
            commit.components.push(StagedComponent {
                component,
                release,
                source_dir: dest,
            });
        }
        Ok(commit)
    }
}

/// Lay out one downloaded asset under `dest` the way its component is installed.
fn unpack(component: Component, asset: &AssetDescriptor, download: &Path, dest: &Path) -> Result<()> {
    ensure_dir(dest)?;
    match component {
        Component::Application if asset.is_archive() => {
            extract_bundle(download, dest)?;
        }
        Component::Application => {
            copy_synced(download, &dest.join(&asset.name))?;
        }
        Component::YtDlp => {
            let target = dest.join(executable_name("yt-dlp"));
            copy_synced(download, &target)?;
            set_executable(&target)?;
        }
        Component::Ffmpeg => {
            let wanted = vec![executable_name("ffmpeg"), executable_name("ffprobe")];
            extract_binaries(download, dest, &wanted)?;
        }
    }
    Ok(())
}

/// Descriptor recorded for a tool shipped inside an application release.
///
/// The tool keeps its own timeline: `channel` is the tool's channel, never the
/// application's. The version is what the staged binary reports; when it can't be
/// asked, a marker that orders against nothing is recorded so the standalone
/// lookup neither upgrades nor downgrades it.
async fn bundled_release(
    component: Component,
    app: &ReleaseDescriptor,
    channel: Channel,
    dir: &Path,
) -> ReleaseDescriptor {
    let binary = match component {
        Component::YtDlp => dir.join(executable_name("yt-dlp")),
        _ => dir.join(executable_name("ffmpeg")),
    };
    let version = match query_version(component, &binary).await {
        Some(version) => version,
        None => {
            debug!(%component, tag = %app.tag, "Bundled tool did not report a version");
            format!("bundled with {}", app.tag)
        }
    };
    ReleaseDescriptor {
        version,
        channel,
        assets: app.assets_for(component).cloned().collect(),
        ..app.clone()
    }
}
