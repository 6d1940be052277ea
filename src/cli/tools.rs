//! `ytconv tools`: update yt-dlp and ffmpeg only.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliOptions;
use super::common::{CommandContext, StdinPrompt, cancel_on_ctrl_c, report_outcome};
use crate::update::{ToolBranch, UpdateRequest};

#[derive(Args, Debug)]
pub struct ToolsCommand {
    /// yt-dlp branch for this run (stable, nightly, master)
    #[arg(long, value_name = "BRANCH")]
    pub branch: Option<ToolBranch>,

    /// Apply without asking
    #[arg(short, long)]
    pub yes: bool,
}

impl ToolsCommand {
    pub async fn execute(self, options: &CliOptions) -> Result<()> {
        let ctx = CommandContext::load(options).await?;
        let branch = self.branch.unwrap_or(ctx.config.tools.ytdlp_branch);
        let request = UpdateRequest::new(ctx.config.update.channel)
            .tools_only()
            .ytdlp_branch(branch)
            .auto_confirm(self.yes);

        println!("{}", format!("Checking tools (yt-dlp {branch})...").cyan());
        let cancel = cancel_on_ctrl_c();
        let outcome = ctx.orchestrator.check_and_apply(&request, &StdinPrompt, &cancel).await;
        report_outcome(outcome)
    }
}
