//! `ytconv downgrade <VERSION>`: the one way to install an older application.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliOptions;
use super::common::{CommandContext, StdinPrompt, cancel_on_ctrl_c, report_outcome};

#[derive(Args, Debug)]
pub struct DowngradeCommand {
    /// Exact version or tag to install (e.g. 1.4.2 or v1.4.2)
    pub version: String,

    /// Apply without asking
    #[arg(short, long)]
    pub yes: bool,
}

impl DowngradeCommand {
    pub async fn execute(self, options: &CliOptions) -> Result<()> {
        let ctx = CommandContext::load(options).await?;
        println!("{}", format!("Installing YoutubeConverter {}...", self.version).cyan());

        let cancel = cancel_on_ctrl_c();
        let outcome = ctx.orchestrator.downgrade_to(&self.version, self.yes, &StdinPrompt, &cancel).await;
        report_outcome(outcome)
    }
}
