//! `ytconv config`: show and change settings.
//!
//! ```bash
//! ytconv config                               # same as `config show`
//! ytconv config get update.channel
//! ytconv config set update.channel nightly    # the only way the channel changes
//! ytconv config set tools.ytdlp_branch master
//! ytconv config path
//! ```

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use crate::config::{CONFIG_KEYS, GlobalConfig};

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: Option<ConfigSubcommands>,
}

#[derive(Subcommand)]
enum ConfigSubcommands {
    /// Show every setting with its current value
    Show,

    /// Print one setting
    Get {
        /// Dotted key, e.g. update.channel
        key: String,
    },

    /// Change one setting
    Set {
        /// Dotted key, e.g. update.channel
        key: String,

        value: String,
    },

    /// Open the config file in $EDITOR
    Edit,

    /// Print the config file location
    Path,
}

impl ConfigCommand {
    pub async fn execute(self, config_path: Option<PathBuf>) -> Result<()> {
        let config_path = GlobalConfig::resolve_path(config_path)?;
        match self.command {
            Some(ConfigSubcommands::Show) | None => Self::show(&config_path).await,
            Some(ConfigSubcommands::Get {
                key,
            }) => Self::get(&config_path, &key).await,
            Some(ConfigSubcommands::Set {
                key,
                value,
            }) => Self::set(&config_path, &key, &value).await,
            Some(ConfigSubcommands::Edit) => Self::edit(&config_path).await,
            Some(ConfigSubcommands::Path) => {
                println!("{}", config_path.display());
                Ok(())
            }
        }
    }

    async fn show(config_path: &std::path::Path) -> Result<()> {
        let config = GlobalConfig::load_from(config_path).await?;

        println!("{}", "ytconv configuration".bold());
        println!("Location: {}", config_path.display());
        if !config_path.exists() {
            println!("{}", "(file does not exist yet; showing defaults)".dimmed());
        }
        println!();

        let defaults = GlobalConfig::default();
        for key in CONFIG_KEYS {
            let value = config.get_value(key).unwrap_or_default();
            let line = format!("{key:<28} = {value}");
            if defaults.get_value(key).unwrap_or_default() == value {
                println!("{line}");
            } else {
                println!("{}", line.green());
            }
        }
        Ok(())
    }

    async fn get(config_path: &std::path::Path, key: &str) -> Result<()> {
        let config = GlobalConfig::load_from(config_path).await?;
        match config.get_value(key) {
            Some(value) => {
                println!("{value}");
                Ok(())
            }
            None => bail!("Unknown config key '{key}'. Valid keys: {}", CONFIG_KEYS.join(", ")),
        }
    }

    async fn set(config_path: &std::path::Path, key: &str, value: &str) -> Result<()> {
        let mut config = GlobalConfig::load_from(config_path).await?;
        let previous = config.get_value(key);
        config.set_value(key, value)?;
        config.save_to(config_path).await?;

        let current = config.get_value(key).unwrap_or_default();
        match previous {
            Some(previous) if previous != current => {
                println!("{} {key}: {previous} -> {}", "✓".green(), current.green());
            }
            _ => println!("{} {key} = {current}", "✓".green()),
        }
        if key == "update.channel" {
            println!("The next 'ytconv update' will install the newest {current} build");
        }
        Ok(())
    }

    async fn edit(config_path: &std::path::Path) -> Result<()> {
        if !config_path.exists() {
            GlobalConfig::default().save_to(config_path).await?;
        }

        let editor = std::env::var("EDITOR").or_else(|_| std::env::var("VISUAL")).unwrap_or_else(|_| {
            if cfg!(target_os = "windows") {
                "notepad".to_string()
            } else {
                "vi".to_string()
            }
        });

        println!("Opening {} in {editor}...", config_path.display());
        let status = tokio::process::Command::new(&editor)
            .arg(config_path)
            .status()
            .await
            .with_context(|| format!("Failed to start editor '{editor}'"))?;
        if !status.success() {
            bail!("Editor exited with {status}");
        }

        // Reject an edit that no longer parses
        GlobalConfig::load_from(config_path).await.context("The edited config is not valid")?;
        Ok(())
    }
}
