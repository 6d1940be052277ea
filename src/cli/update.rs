//! `ytconv update`: check for and apply updates.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tracing::debug;

use super::CliOptions;
use super::common::{CommandContext, StdinPrompt, cancel_on_ctrl_c, report_outcome};
use crate::update::{Channel, CheckCache, UpdateOutcome, UpdateRequest};

/// Check for and apply updates.
#[derive(Args, Debug)]
pub struct UpdateCommand {
    /// Channel for this run only; the configured channel is not changed
    #[arg(long, value_name = "CHANNEL")]
    pub channel: Option<Channel>,

    /// Apply without asking
    #[arg(short, long)]
    pub yes: bool,

    /// Only report what would be updated
    #[arg(long, conflicts_with = "yes")]
    pub check: bool,

    /// Leave yt-dlp and ffmpeg alone
    #[arg(long)]
    pub no_tools: bool,
}

impl UpdateCommand {
    pub async fn execute(self, options: &CliOptions) -> Result<()> {
        let ctx = CommandContext::load(options).await?;
        let channel = self.channel.unwrap_or(ctx.config.update.channel);
        let request = UpdateRequest::new(channel)
            .auto_confirm(self.yes || ctx.config.update.auto_update)
            .with_tools(!self.no_tools && ctx.config.tools.ytdlp_auto_update)
            .ytdlp_branch(ctx.config.tools.ytdlp_branch);

        if self.check {
            return check_only(&ctx, &request).await;
        }

        println!("{}", format!("Checking for updates ({channel} channel)...").cyan());
        let cancel = cancel_on_ctrl_c();
        let outcome = ctx.orchestrator.check_and_apply(&request, &StdinPrompt, &cancel).await;

        if let UpdateOutcome::Applied(_) = &outcome {
            if let Err(e) = ctx.check_cache().clear().await {
                debug!("Failed to clear update check cache: {e}");
            }
        }
        report_outcome(outcome)
    }
}

async fn check_only(ctx: &CommandContext, request: &UpdateRequest) -> Result<()> {
    println!("{}", format!("Checking for updates ({} channel)...", request.channel).cyan());
    let plan = ctx.orchestrator.check(request).await.context("Failed to check for updates")?;

    let mut cache = CheckCache::from_plan(request.channel, &plan);
    if plan.has_updates() {
        println!("{}", "Updates available:".bold());
        for action in plan.eligible() {
            println!("  {action}");
        }
        println!("Run {} to install them", "ytconv update".cyan().bold());
        cache.mark_notified();
    } else {
        println!("{}", "Everything is up to date".green());
    }
    for failure in &plan.failures {
        println!("{} {}: {}", "!".yellow(), failure.component, failure.error);
    }

    if let Err(e) = ctx.check_cache().save(&cache).await {
        debug!("Failed to save update check cache: {e}");
    }
    Ok(())
}
