//! User configuration for ytconv.
//!
//! A single TOML file holds every user-level setting:
//!
//! - Unix/macOS: `~/.ytconv/config.toml`
//! - Windows: `%LOCALAPPDATA%\ytconv\config.toml`
//!
//! The location can be overridden with `--config <PATH>` or the `YTCONV_CONFIG`
//! environment variable. A missing file is not an error; every setting has a default.
//!
//! The update check cache (`.update_check`) lives next to this file.

pub mod global;

pub use global::{CONFIG_KEYS, CONFIG_PATH_ENV, GlobalConfig, ToolsConfig, UpdateConfig};
