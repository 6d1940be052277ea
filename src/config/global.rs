//! User-wide configuration (`~/.ytconv/config.toml`).
//!
//! ```toml
//! [update]
//! channel = "release"
//! check_on_startup = true
//! check_interval = 86400
//!
//! [tools]
//! ytdlp_branch = "stable"
//! ```
//!
//! Every field has a default, and fields equal to their default are not written
//! back, so a fresh file stays small.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::constants::{
    DEFAULT_API_BASE, DEFAULT_APP_ASSET_PREFIX, DEFAULT_APP_REPO, DEFAULT_CHECK_INTERVAL_SECS,
    DEFAULT_FFMPEG_BUILD_MARKER, DEFAULT_FFMPEG_REPO, DEFAULT_MAX_RETRIES,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::update::{Channel, ToolBranch};

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "YTCONV_CONFIG";

/// Settings of the application update itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Channel the application follows. Changed only by an explicit `config set`.
    pub channel: Channel,
    /// Apply updates found at startup without asking.
    pub auto_update: bool,
    pub check_on_startup: bool,
    /// Seconds between automatic checks; 0 disables them.
    pub check_interval: u64,
    /// `owner/name` of the application's release repository.
    pub app_repo: String,
    pub app_asset_prefix: String,
    /// Base URL of the release index API.
    pub api_base: String,
    pub max_retries: usize,
    pub request_timeout_secs: u64,
    /// Install root. Defaults to the directory of the running executable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<PathBuf>,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            channel: Channel::Release,
            auto_update: false,
            check_on_startup: true,
            check_interval: DEFAULT_CHECK_INTERVAL_SECS,
            app_repo: DEFAULT_APP_REPO.to_string(),
            app_asset_prefix: DEFAULT_APP_ASSET_PREFIX.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            install_dir: None,
        }
    }
}

impl UpdateConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Settings of the bundled tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ytdlp_branch: ToolBranch,
    /// Update the tools along with the application.
    pub ytdlp_auto_update: bool,
    pub ffmpeg_repo: String,
    pub ffmpeg_build_marker: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ytdlp_branch: ToolBranch::Stable,
            ytdlp_auto_update: true,
            ffmpeg_repo: DEFAULT_FFMPEG_REPO.to_string(),
            ffmpeg_build_marker: DEFAULT_FFMPEG_BUILD_MARKER.to_string(),
        }
    }
}

fn is_default_update(config: &UpdateConfig) -> bool {
    *config == UpdateConfig::default()
}

fn is_default_tools(config: &ToolsConfig) -> bool {
    *config == ToolsConfig::default()
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default, skip_serializing_if = "is_default_update")]
    pub update: UpdateConfig,
    #[serde(default, skip_serializing_if = "is_default_tools")]
    pub tools: ToolsConfig,
}

/// Keys accepted by [`GlobalConfig::get_value`] and [`GlobalConfig::set_value`].
pub const CONFIG_KEYS: &[&str] = &[
    "update.channel",
    "update.auto_update",
    "update.check_on_startup",
    "update.check_interval",
    "update.app_repo",
    "update.app_asset_prefix",
    "update.api_base",
    "update.max_retries",
    "update.request_timeout_secs",
    "update.install_dir",
    "tools.ytdlp_branch",
    "tools.ytdlp_auto_update",
    "tools.ffmpeg_repo",
    "tools.ffmpeg_build_marker",
];

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => bail!("'{value}' is not a valid boolean for {key}"),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| anyhow::anyhow!("'{value}' is not a valid number for {key}"))
}

fn parse_repo(key: &str, value: &str) -> Result<String> {
    let value = value.trim();
    match value.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok(value.to_string())
        }
        _ => bail!("'{value}' is not an owner/name repository for {key}"),
    }
}

impl GlobalConfig {
    /// Default location: `~/.ytconv/config.toml`, or
    /// `%LOCALAPPDATA%\ytconv\config.toml` on Windows.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("ytconv")
        } else {
            crate::utils::get_home_dir()?.join(".ytconv")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// The config path to use: explicit, then `YTCONV_CONFIG`, then the default.
    pub fn resolve_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }
        Self::default_path()
    }

    /// Load from `path`; a missing file gives the defaults.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read config from {}", path.display()));
            }
        };

        toml::from_str(&content).with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        Self::load_from(&Self::resolve_path(path)?).await
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || crate::utils::atomic_write(&target, content.as_bytes()))
            .await
            .context("Config write task failed")?
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }

    /// Read a setting by its dotted key.
    #[must_use]
    pub fn get_value(&self, key: &str) -> Option<String> {
        let u = &self.update;
        let t = &self.tools;
        Some(match key {
            "update.channel" => u.channel.to_string(),
            "update.auto_update" => u.auto_update.to_string(),
            "update.check_on_startup" => u.check_on_startup.to_string(),
            "update.check_interval" => u.check_interval.to_string(),
            "update.app_repo" => u.app_repo.clone(),
            "update.app_asset_prefix" => u.app_asset_prefix.clone(),
            "update.api_base" => u.api_base.clone(),
            "update.max_retries" => u.max_retries.to_string(),
            "update.request_timeout_secs" => u.request_timeout_secs.to_string(),
            "update.install_dir" => {
                u.install_dir.as_ref().map_or_else(String::new, |p| p.display().to_string())
            }
            "tools.ytdlp_branch" => t.ytdlp_branch.to_string(),
            "tools.ytdlp_auto_update" => t.ytdlp_auto_update.to_string(),
            "tools.ffmpeg_repo" => t.ffmpeg_repo.clone(),
            "tools.ffmpeg_build_marker" => t.ffmpeg_build_marker.clone(),
            _ => return None,
        })
    }

    /// Change a setting by its dotted key, validating the value.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let u = &mut self.update;
        let t = &mut self.tools;
        match key {
            "update.channel" => u.channel = value.parse()?,
            "update.auto_update" => u.auto_update = parse_bool(key, value)?,
            "update.check_on_startup" => u.check_on_startup = parse_bool(key, value)?,
            "update.check_interval" => u.check_interval = parse_number(key, value)?,
            "update.app_repo" => u.app_repo = parse_repo(key, value)?,
            "update.app_asset_prefix" => u.app_asset_prefix = value.trim().to_lowercase(),
            "update.api_base" => {
                let base = value.trim().trim_end_matches('/');
                if !(base.starts_with("https://") || base.starts_with("http://")) {
                    bail!("'{value}' is not an http(s) URL for {key}");
                }
                u.api_base = base.to_string();
            }
            "update.max_retries" => u.max_retries = parse_number(key, value)?,
            "update.request_timeout_secs" => {
                let secs: u64 = parse_number(key, value)?;
                if secs == 0 {
                    bail!("{key} must be at least 1 second");
                }
                u.request_timeout_secs = secs;
            }
            "update.install_dir" => {
                u.install_dir = if value.trim().is_empty() { None } else { Some(PathBuf::from(value.trim())) };
            }
            "tools.ytdlp_branch" => t.ytdlp_branch = value.parse()?,
            "tools.ytdlp_auto_update" => t.ytdlp_auto_update = parse_bool(key, value)?,
            "tools.ffmpeg_repo" => t.ffmpeg_repo = parse_repo(key, value)?,
            "tools.ffmpeg_build_marker" => t.ffmpeg_build_marker = value.trim().to_lowercase(),
            _ => bail!("Unknown config key '{key}'. Valid keys: {}", CONFIG_KEYS.join(", ")),
        }
        Ok(())
    }

    /// Install root: the configured one, else the running executable's directory.
    pub fn install_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.update.install_dir {
            return Ok(dir.clone());
        }
        let exe = std::env::current_exe().context("Unable to locate the running executable")?;
        exe.parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| anyhow::anyhow!("Executable {} has no parent directory", exe.display()))
    }
}
