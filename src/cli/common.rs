//! Wiring shared by the update commands: config, orchestrator, prompt, and output.

use anyhow::{Context, Result};
use colored::Colorize;
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::CliOptions;
use crate::config::GlobalConfig;
use crate::update::{
    AppliedUpdate, AssetRules, ChannelResolver, CheckCacheStore, Fetcher, HttpClient,
    InstallLayout, JsonVersionStore, RetryPolicy, UpdateOrchestrator, UpdateOutcome, UpdatePlan,
    UpdatePrompt, UpdateSources,
};
use crate::utils::DownloadProgress;

/// Everything a command needs to talk to one install.
pub struct CommandContext {
    pub config: GlobalConfig,
    pub config_path: PathBuf,
    pub layout: InstallLayout,
    pub orchestrator: UpdateOrchestrator,
}

impl CommandContext {
    /// Load the config and build an orchestrator for the install root.
    pub async fn load(options: &CliOptions) -> Result<Self> {
        let config_path = GlobalConfig::resolve_path(options.config_path.clone())?;
        let config = GlobalConfig::load_from(&config_path).await?;
        Self::from_config(config, config_path, options)
    }

    pub fn from_config(config: GlobalConfig, config_path: PathBuf, options: &CliOptions) -> Result<Self> {
        let root = match &options.install_dir {
            Some(dir) => dir.clone(),
            None => config.install_dir()?,
        };
        debug!(root = %root.display(), config = %config_path.display(), "Using install root");

        let layout = InstallLayout::new(root);
        let http = HttpClient::new(&config.update.api_base, config.update.request_timeout())
            .context("Failed to set up the HTTP client")?;
        let retry = RetryPolicy::with_max_retries(config.update.max_retries);
        let rules = AssetRules::new(&config.update.app_asset_prefix, &config.tools.ffmpeg_build_marker);

        let mut fetcher = Fetcher::new(http.clone(), retry);
        if !options.no_progress && !options.quiet {
            fetcher = fetcher.with_progress(DownloadProgress::new());
        }

        let orchestrator = UpdateOrchestrator::new(
            layout.clone(),
            Arc::new(JsonVersionStore::new(&layout)),
            ChannelResolver::new(http, retry, rules),
            fetcher,
            UpdateSources {
                app_repo: config.update.app_repo.clone(),
                ffmpeg_repo: config.tools.ffmpeg_repo.clone(),
            },
        );

        Ok(Self {
            config,
            config_path,
            layout,
            orchestrator,
        })
    }

    /// The update-check cache, stored next to the config file.
    #[must_use]
    pub fn check_cache(&self) -> CheckCacheStore {
        CheckCacheStore::in_dir(self.config_path.parent().unwrap_or_else(|| Path::new(".")))
    }
}

/// Asks on the terminal. Declines when stdin is not interactive.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinPrompt;

impl UpdatePrompt for StdinPrompt {
    fn confirm(&self, plan: &UpdatePlan) -> bool {
        println!("{}", "Updates available:".bold());
        for action in plan.eligible() {
            println!("  {action}");
        }

        if !std::io::stdin().is_terminal() {
            println!("{}", "Not asking on a non-interactive terminal; rerun with --yes to apply".yellow());
            return false;
        }

        print!("Apply now? [y/N] ");
        if std::io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

/// A token cancelled by Ctrl-C.
#[must_use]
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Cancelling...".yellow());
            token.cancel();
        }
    });
    cancel
}

fn print_applied(applied: &AppliedUpdate) {
    for (component, version) in &applied.components {
        println!("{} {component} {version}", "✓".green());
    }
    for failure in &applied.failures {
        println!("{} {failure}", "✗".red());
    }
    if let Some(relaunch) = &applied.relaunch {
        println!(
            "{}",
            format!(
                "Restart YoutubeConverter to finish the update ({} is staged)",
                relaunch.pending.display()
            )
            .yellow()
        );
    }
}

/// Print an outcome; `Failed` becomes an error so the process exits non-zero.
pub fn report_outcome(outcome: UpdateOutcome) -> Result<()> {
    match outcome {
        UpdateOutcome::UpToDate => {
            println!("{}", "Everything is up to date".green());
            Ok(())
        }
        UpdateOutcome::Applied(applied) => {
            print_applied(&applied);
            if applied.failures.is_empty() {
                println!("{}", "Update complete".green().bold());
            } else {
                println!("{}", "Update partially complete".yellow().bold());
            }
            Ok(())
        }
        UpdateOutcome::Declined(_) => {
            println!("No changes made");
            Ok(())
        }
        UpdateOutcome::Failed(report) => Err(anyhow::Error::new(report.error.clone()))
            .with_context(|| match (report.component, report.version.as_deref()) {
                (Some(component), Some(version)) => format!("Failed to update {component} to {version}"),
                (Some(component), None) => format!("Failed to update {component}"),
                _ => "Update failed".to_string(),
            }),
    }
}
