//! `ytconv status`, plus the update check that runs on a normal start.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tracing::debug;

use super::CliOptions;
use super::common::CommandContext;
use crate::update::check_cache::display_update_notification;
use crate::update::tools::system_ffmpeg;
use crate::update::{CheckCache, Component, ComponentRecord, UpdateRequest};

/// Show installed versions and the last update check.
#[derive(Args, Debug)]
pub struct StatusCommand {}

fn describe(record: &ComponentRecord) -> String {
    let Some(version) = &record.version else {
        return "not installed".dimmed().to_string();
    };
    let mut line = version.green().to_string();
    if let Some(channel) = record.channel {
        line.push_str(&format!(" ({channel})"));
    }
    if let Some(updated) = record.updated_at {
        line.push_str(&format!(", updated {}", updated.format("%Y-%m-%d %H:%M UTC")));
    }
    line
}

fn interrupted_updates(ctx: &CommandContext) -> usize {
    std::fs::read_dir(ctx.layout.rollback_dir())
        .map(|entries| entries.filter_map(std::result::Result::ok).filter(|e| e.path().is_dir()).count())
        .unwrap_or(0)
}

impl StatusCommand {
    pub async fn execute(self, options: &CliOptions) -> Result<()> {
        let ctx = CommandContext::load(options).await?;
        let state = ctx.orchestrator.installed_state().await?;

        println!("{}", "YoutubeConverter".bold());
        println!("  Install root: {}", ctx.layout.root().display());
        println!("  Channel:      {}", ctx.config.update.channel);
        println!("  yt-dlp:       {}", ctx.config.tools.ytdlp_branch);
        println!();
        for component in Component::ALL {
            println!("  {:<12}  {}", component.to_string(), describe(state.record(component)));
        }
        if let Some(path) = system_ffmpeg() {
            println!("  {:<12}  {}", "system ffmpeg", path.display().to_string().dimmed());
        }

        match ctx.check_cache().load().await {
            Ok(Some(cache)) => {
                println!();
                let checked = cache.checked_at.format("%Y-%m-%d %H:%M UTC");
                if cache.update_available {
                    println!(
                        "  Last check:   {checked}, update available ({})",
                        cache.latest_version.as_deref().unwrap_or("tools").yellow()
                    );
                } else {
                    println!("  Last check:   {checked}, up to date");
                }
            }
            Ok(None) => {}
            Err(e) => debug!("Failed to read update check cache: {e}"),
        }

        let interrupted = interrupted_updates(&ctx);
        if interrupted > 0 {
            println!();
            println!(
                "{}",
                format!("{interrupted} interrupted update(s) found; run 'ytconv recover'").yellow()
            );
        }
        Ok(())
    }
}

/// Refresh a stale update check and print a reminder when one is due.
///
/// Never fails: a check that can't be made is only logged.
pub async fn startup_check(options: CliOptions) {
    if let Err(e) = run_startup_check(&options).await {
        debug!("Startup update check failed: {e:#}");
    }
}

async fn run_startup_check(options: &CliOptions) -> Result<()> {
    let ctx = CommandContext::load(options).await?;
    let update = &ctx.config.update;
    if !update.check_on_startup || update.check_interval == 0 {
        debug!("Automatic update checks are disabled");
        return Ok(());
    }

    let store = ctx.check_cache();
    let cached = store.load().await?.filter(|c| c.channel == update.channel);
    let mut cache = match cached {
        Some(cache) if cache.is_valid(update.check_interval) => cache,
        previous => {
            debug!("Performing automatic update check");
            let request = UpdateRequest::new(update.channel)
                .with_tools(ctx.config.tools.ytdlp_auto_update)
                .ytdlp_branch(ctx.config.tools.ytdlp_branch);
            let plan = ctx.orchestrator.check(&request).await?;
            let mut fresh = CheckCache::from_plan(update.channel, &plan);
            // Same update as last time: keep the reminder backoff going
            if let Some(previous) = previous.filter(|p| p.latest_version == fresh.latest_version) {
                fresh.notified = previous.notified;
                fresh.notification_count = previous.notification_count;
            }
            fresh
        }
    };

    if cache.should_notify() {
        display_update_notification(&cache);
        cache.mark_notified();
    }
    store.save(&cache).await?;
    Ok(())
}
