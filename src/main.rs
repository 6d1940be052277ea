//! ytconv CLI entry point
//!
//! Parses arguments, installs logging, runs the command, and renders errors with
//! their suggestions.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use ytconv::cli;
use ytconv::core::user_friendly_error;

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    init_logging(cli.log_level());

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
