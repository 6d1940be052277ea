//! Command-line interface for ytconv.
//!
//! # Available Commands
//!
//! - `update` - Check for and apply application (and tool) updates
//! - `tools` - Update only yt-dlp and ffmpeg
//! - `downgrade` - Install an exact, possibly older, application version
//! - `recover` - Roll back an interrupted update and remove leftovers
//! - `status` - Show installed versions and the last update check
//! - `config` - Show or change settings
//!
//! `complete-swap` is hidden: it is run by the launcher after the previous process
//! exited, to move a staged executable into place.
//!
//! # Global Options
//!
//! - `--verbose` / `-v` - Debug logging
//! - `--quiet` / `-q` - Errors only
//! - `--config` / `-c` - Config file path (also `YTCONV_CONFIG`)
//! - `--install-dir` - Install root (also `YTCONV_INSTALL_DIR`)
//! - `--no-progress` - Hide download progress bars
//!
//! # Examples
//!
//! ```bash
//! ytconv update --check
//! ytconv update --yes
//! ytconv tools --branch nightly
//! ytconv config set update.channel prerelease
//! ```

mod common;
pub mod config;
mod downgrade;
mod recover;
mod status;
mod tools;
mod update;


use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

pub use common::{CommandContext, StdinPrompt};

/// How long a finished command waits for the startup update check.
const STARTUP_CHECK_GRACE: Duration = Duration::from_secs(5);

/// Settings derived from the global flags, shared by every command.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    /// Config file given with `--config`.
    pub config_path: Option<PathBuf>,
    /// Install root given with `--install-dir`.
    pub install_dir: Option<PathBuf>,
    pub no_progress: bool,
    pub quiet: bool,
}

impl CliOptions {
    /// Export the options that are read further down through the environment.
    pub fn apply_to_env(&self) {
        // SAFETY: called once on the main thread before any task is spawned
        if self.no_progress || self.quiet {
            unsafe { std::env::set_var("YTCONV_NO_PROGRESS", "1") };
        }
    }
}

/// Keep YoutubeConverter and its bundled tools up to date.
#[derive(Parser)]
#[command(
    name = "ytconv",
    about = "Self-updating shell for YoutubeConverter and its bundled yt-dlp/ffmpeg",
    version,
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the config file
    #[arg(short, long, global = true, env = "YTCONV_CONFIG")]
    config: Option<PathBuf>,

    /// Install root of YoutubeConverter (defaults to the executable's directory)
    #[arg(long, global = true, env = "YTCONV_INSTALL_DIR")]
    install_dir: Option<PathBuf>,

    /// Hide download progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check for and apply updates on the configured channel
    Update(update::UpdateCommand),

    /// Update only yt-dlp and ffmpeg
    Tools(tools::ToolsCommand),

    /// Install an exact application version, even an older one
    Downgrade(downgrade::DowngradeCommand),

    /// Roll back an interrupted update and clean up leftovers
    Recover(recover::RecoverCommand),

    /// Show installed versions and the last update check
    Status(status::StatusCommand),

    /// Show or change settings
    Config(config::ConfigCommand),

    /// Move a staged executable into place after the old process exited
    #[command(hide = true)]
    CompleteSwap(recover::CompleteSwapCommand),
}

impl Commands {
    /// Commands that count as a normal start, after which a stale update check is
    /// refreshed.
    const fn runs_startup_check(&self) -> bool {
        matches!(self, Self::Status(_) | Self::Recover(_))
    }
}

impl Cli {
    /// Log filter level: `-v` debug, `-q` error, warn otherwise.
    #[must_use]
    pub const fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        }
    }

    #[must_use]
    pub fn build_options(&self) -> CliOptions {
        CliOptions {
            config_path: self.config.clone(),
            install_dir: self.install_dir.clone(),
            no_progress: self.no_progress,
            quiet: self.quiet,
        }
    }

    pub async fn execute(self) -> Result<()> {
        let options = self.build_options();
        options.apply_to_env();

        // Runs alongside the command; it only reads the install.
        let startup_check = (self.command.runs_startup_check() && !options.quiet)
            .then(|| tokio::spawn(status::startup_check(options.clone())));

        let result = match self.command {
            Commands::Update(cmd) => cmd.execute(&options).await,
            Commands::Tools(cmd) => cmd.execute(&options).await,
            Commands::Downgrade(cmd) => cmd.execute(&options).await,
            Commands::Recover(cmd) => cmd.execute(&options).await,
            Commands::Status(cmd) => cmd.execute(&options).await,
            Commands::Config(cmd) => cmd.execute(options.config_path.clone()).await,
            Commands::CompleteSwap(cmd) => cmd.execute(),
        };

        if let Some(handle) = startup_check {
            if tokio::time::timeout(STARTUP_CHECK_GRACE, handle).await.is_err() {
                tracing::debug!("Startup update check did not finish in time");
            }
        }
        result
    }
}
