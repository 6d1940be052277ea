use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::channel::Channel;
use super::plan::UpdatePlan;
use super::release::Component;
use crate::utils::atomic_write;

/// File name of the cache, next to the config file.
pub const CHECK_CACHE_FILE: &str = ".update_check";

/// Result of the last update check, with reminder tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckCache {
    /// Channel the check was made for.
    pub channel: Channel,
    /// Application version installed at check time.
    pub installed_version: Option<String>,
    /// Newest application version found, if any.
    pub latest_version: Option<String>,
    pub checked_at: DateTime<Utc>,
    /// Whether any component had an eligible update.
    pub update_available: bool,
    #[serde(default)]
    pub notified: bool,
    #[serde(default)]
    pub notification_count: u32,
}

impl CheckCache {
    /// Record the outcome of a check.
    #[must_use]
    pub fn from_plan(channel: Channel, plan: &UpdatePlan) -> Self {
        let app = plan.action(Component::Application);
        Self {
            channel,
            installed_version: app.and_then(|a| a.installed.clone()),
            latest_version: app.map(|a| a.candidate.version.clone()),
            checked_at: Utc::now(),
            update_available: plan.has_updates(),
            notified: false,
            notification_count: 0,
        }
    }

    /// Whether the cached result is younger than `interval_seconds`.
    #[must_use]
    pub fn is_valid(&self, interval_seconds: u64) -> bool {
        let age = Utc::now() - self.checked_at;
        age.num_seconds() < i64::try_from(interval_seconds).unwrap_or(i64::MAX)
    }

    pub fn mark_notified(&mut self) {
        self.notified = true;
        self.notification_count += 1;
    }

    /// Whether to (re)notify about the cached update.
    ///
    /// The first notification is immediate; reminders back off to 24h, 48h, 96h
    /// and at most 192h after the check.
    #[must_use]
    pub fn should_notify(&self) -> bool {
        if !self.update_available {
            return false;
        }
        if !self.notified {
            return true;
        }

        let hours_since_check = (Utc::now() - self.checked_at).num_hours();
        let backoff_hours = 24 * (1i64 << self.notification_count.min(3));
        hours_since_check >= backoff_hours
    }
}

/// Persists the [`CheckCache`] as JSON.
#[derive(Debug, Clone)]
pub struct CheckCacheStore {
    path: PathBuf,
}

impl CheckCacheStore {
    /// Store the cache in `dir`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(CHECK_CACHE_FILE),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The cached check, if one exists and is readable.
    pub async fn load(&self) -> Result<Option<CheckCache>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No update check cache found");
                return Ok(None);
            }
            Err(e) => return Err(e).context("Failed to read update check cache"),
        };

        match serde_json::from_str(&content) {
            Ok(cache) => Ok(Some(cache)),
            Err(e) => {
                debug!("Ignoring unreadable update check cache: {e}");
                Ok(None)
            }
        }
    }

    pub async fn save(&self, cache: &CheckCache) -> Result<()> {
        let content = serde_json::to_vec_pretty(cache).context("Failed to serialize update check cache")?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || atomic_write(&path, &content))
            .await
            .context("Cache write task failed")?
            .context("Failed to write update check cache")?;
        debug!("Saved update check to cache");
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("Cleared update check cache");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove update check cache"),
        }
    }
}

/// Print the "update available" banner to stderr.
pub fn display_update_notification(cache: &CheckCache) {
    let current = cache.installed_version.as_deref().unwrap_or("unknown");
    let latest = cache.latest_version.as_deref().unwrap_or("a newer build");
    let rule = "━".repeat(56);

    eprintln!();
    eprintln!("{}", rule.bright_cyan());
    eprintln!("An update for YoutubeConverter is available ({} channel)", cache.channel);
    eprintln!();
    eprintln!("  Installed: {}", current.yellow());
    eprintln!("  Latest:    {}", latest.green().bold());
    eprintln!();
    eprintln!("  Run {} to install it", "ytconv update".cyan().bold());
    eprintln!("  To turn these checks off: {}", "ytconv config set update.check_on_startup false".dimmed());
    eprintln!("{}", rule.bright_cyan());
    eprintln!();
}
