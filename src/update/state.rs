//! Persisted record of what is installed.
//!
//! The record is only ever written by the commit step of the applier. Reads go through
//! the [`VersionStore`] trait so the orchestrator can be driven against an in-memory
//! store in tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, warn};

use super::channel::Channel;
use super::layout::InstallLayout;
use super::release::{Component, ReleaseDescriptor};
use crate::core::{Result, UpdateError};
use crate::utils::atomic_write;

/// What is installed for a single component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRecord {
    /// Installed version identifier, `None` when the component is absent or unknown.
    pub version: Option<String>,
    /// Channel the installed build came from. `None` when it was seeded rather than
    /// installed by an update.
    pub channel: Option<Channel>,
    /// Publish timestamp of the installed build; the nightly ordering key.
    pub published_at: Option<DateTime<Utc>>,
    /// When this record was last committed.
    pub updated_at: Option<DateTime<Utc>>,
}

impl ComponentRecord {
    #[must_use]
    pub const fn is_installed(&self) -> bool {
        self.version.is_some()
    }

    /// A record for a version found on disk without update metadata.
    pub fn seeded(version: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            ..Self::default()
        }
    }
}

/// Installed versions of all components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledState {
    #[serde(default)]
    pub application: ComponentRecord,
    #[serde(default, rename = "yt-dlp")]
    pub yt_dlp: ComponentRecord,
    #[serde(default)]
    pub ffmpeg: ComponentRecord,
    #[serde(default)]
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl InstalledState {
    #[must_use]
    pub const fn record(&self, component: Component) -> &ComponentRecord {
        match component {
            Component::Application => &self.application,
            Component::YtDlp => &self.yt_dlp,
            Component::Ffmpeg => &self.ffmpeg,
        }
    }

    pub fn record_mut(&mut self, component: Component) -> &mut ComponentRecord {
        match component {
            Component::Application => &mut self.application,
            Component::YtDlp => &mut self.yt_dlp,
            Component::Ffmpeg => &mut self.ffmpeg,
        }
    }

    /// Record that `release` is now installed for `component`.
    pub fn mark_installed(
        &mut self,
        component: Component,
        release: &ReleaseDescriptor,
        now: DateTime<Utc>,
    ) {
        *self.record_mut(component) = ComponentRecord {
            version: Some(release.version.clone()),
            channel: Some(release.channel),
            published_at: release.published_at,
            updated_at: Some(now),
        };
        self.last_updated_at = Some(now);
    }
}

/// Durable storage of the [`InstalledState`].
///
/// `save` must be durable on return: a crash right after it either leaves the old
/// record or the new one, never a torn file.
pub trait VersionStore: Send + Sync {
    /// Load the current record.
    fn load(&self) -> Result<InstalledState>;

    /// Persist a new record.
    fn save(&self, state: &InstalledState) -> Result<()>;
}

/// JSON file store at `<root>/installed.json`.
///
/// When the file doesn't exist the application version is seeded from the legacy
/// `version.txt` marker, or from this binary's own version.
#[derive(Debug, Clone)]
pub struct JsonVersionStore {
    path: PathBuf,
    legacy_version_file: PathBuf,
}

impl JsonVersionStore {
    #[must_use]
    pub fn new(layout: &InstallLayout) -> Self {
        Self {
            path: layout.state_file(),
            legacy_version_file: layout.legacy_version_file(),
        }
    }

    /// Whether the record has been written at least once.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn seed(&self) -> InstalledState {
        let version = match fs::read_to_string(&self.legacy_version_file) {
            Ok(content) if !content.trim().is_empty() => {
                let version = content.trim().trim_start_matches(['v', 'V']).to_string();
                debug!(version = %version, "Seeded application version from legacy marker");
                version
            }
            _ => env!("CARGO_PKG_VERSION").to_string(),
        };

        InstalledState {
            application: ComponentRecord::seeded(version),
            ..InstalledState::default()
        }
    }
}

impl VersionStore for JsonVersionStore {
    fn load(&self) -> Result<InstalledState> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(self.seed()),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&content).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "Installed state is unreadable");
            UpdateError::State {
                reason: format!("{} is not valid: {e}", self.path.display()),
            }
        })
    }

    fn save(&self, state: &InstalledState) -> Result<()> {
        let json = serde_json::to_vec_pretty(state).map_err(|e| UpdateError::State {
            reason: e.to_string(),
        })?;
        atomic_write(&self.path, &json)?;
        debug!(path = %self.path.display(), "Saved installed state");
        Ok(())
    }
}

/// Store kept in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    state: Mutex<InstalledState>,
}

impl MemoryVersionStore {
    #[must_use]
    pub fn new(state: InstalledState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }
}

impl VersionStore for MemoryVersionStore {
    fn load(&self) -> Result<InstalledState> {
        self.state.lock().map(|s| s.clone()).map_err(|e| UpdateError::State {
            reason: e.to_string(),
        })
    }

    fn save(&self, state: &InstalledState) -> Result<()> {
        let mut guard = self.state.lock().map_err(|e| UpdateError::State {
            reason: e.to_string(),
        })?;
        *guard = state.clone();
        Ok(())
    }
}
