//! `ytconv recover` and the hidden `ytconv complete-swap`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use super::CliOptions;
use super::common::CommandContext;
use crate::update::self_replace::complete_pending;

/// Roll back an interrupted update and clean up leftovers.
#[derive(Args, Debug)]
pub struct RecoverCommand {}

impl RecoverCommand {
    pub async fn execute(self, options: &CliOptions) -> Result<()> {
        let ctx = CommandContext::load(options).await?;
        let report = ctx.orchestrator.recover().await.context("Recovery failed")?;

        if report.restored == 0 && report.discarded == 0 {
            println!("{}", "Nothing to recover".green());
        } else {
            if report.restored > 0 {
                println!("{}", format!("Rolled back {} interrupted update(s)", report.restored).yellow());
            }
            if report.discarded > 0 {
                println!("Removed {} finished rollback journal(s)", report.discarded);
            }
        }
        Ok(())
    }
}

/// Rename `<exe>.new` over `<exe>`.
#[derive(Args, Debug)]
pub struct CompleteSwapCommand {
    /// Executable to complete (defaults to this one)
    #[arg(long, value_name = "PATH")]
    pub executable: Option<PathBuf>,
}

impl CompleteSwapCommand {
    pub fn execute(self) -> Result<()> {
        let exe = match self.executable {
            Some(path) => path,
            None => std::env::current_exe().context("Unable to locate the running executable")?,
        };
        let swapped = complete_pending(&exe)
            .with_context(|| format!("Failed to move the staged executable over {}", exe.display()))?;
        if swapped {
            println!("{}", format!("Updated {}", exe.display()).green());
        }
        Ok(())
    }
}
