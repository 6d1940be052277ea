//! Release and asset descriptors, and the release index wire format.
//!
//! The index is the GitHub releases API. [`GitHubRelease`] and [`GitHubAsset`] mirror the
//! JSON payload; [`ReleaseDescriptor`] and [`AssetDescriptor`] are the normalized form the
//! rest of the pipeline works with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::channel::Channel;
use crate::constants::NIGHTLY_TAG;

/// One independently versioned piece of the installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Component {
    /// The application bundle itself.
    Application,
    /// The yt-dlp downloader.
    YtDlp,
    /// The ffmpeg/ffprobe pair.
    Ffmpeg,
}

impl Component {
    /// All components, in apply order.
    pub const ALL: [Self; 3] = [Self::Application, Self::YtDlp, Self::Ffmpeg];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::YtDlp => "yt-dlp",
            Self::Ffmpeg => "ffmpeg",
        }
    }

    /// Whether this is one of the bundled external tools.
    #[must_use]
    pub const fn is_tool(&self) -> bool {
        matches!(self, Self::YtDlp | Self::Ffmpeg)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A downloadable file belonging to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    /// File name as published.
    pub name: String,
    /// Download URL.
    pub url: String,
    /// Declared size in bytes, if the index reports one.
    pub size: Option<u64>,
    /// Expected SHA-256 digest, lowercase hex without prefix.
    pub checksum: Option<String>,
    /// Component this asset installs.
    pub component: Component,
}

impl AssetDescriptor {
    /// Whether the asset is a zip archive.
    #[must_use]
    pub fn is_archive(&self) -> bool {
        self.name.to_lowercase().ends_with(".zip")
    }
}

/// A single published build, normalized from the release index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDescriptor {
    /// Version identifier with any leading `v` removed. For nightly builds this is the
    /// release name when it carries a version, else the tag.
    pub version: String,
    /// The tag the release was published under.
    pub tag: String,
    /// Channel the release was resolved on.
    pub channel: Channel,
    /// Publish timestamp; the ordering key on the nightly channel.
    pub published_at: Option<DateTime<Utc>>,
    pub draft: bool,
    pub prerelease: bool,
    /// Classified assets. Unrecognised assets are dropped.
    pub assets: Vec<AssetDescriptor>,
    /// Repository (`owner/name`) the release was read from.
    pub source: String,
}

impl ReleaseDescriptor {
    /// Assets that install the given component.
    pub fn assets_for(&self, component: Component) -> impl Iterator<Item = &AssetDescriptor> {
        self.assets.iter().filter(move |a| a.component == component)
    }

    /// Whether the release ships an asset for the given component.
    #[must_use]
    pub fn has_component(&self, component: Component) -> bool {
        self.assets_for(component).next().is_some()
    }

    /// Components the release carries, in apply order.
    #[must_use]
    pub fn components(&self) -> Vec<Component> {
        Component::ALL.into_iter().filter(|c| self.has_component(*c)).collect()
    }
}

/// A release as returned by the GitHub API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

impl GitHubRelease {
    /// Publish time, falling back to creation time for drafts.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.published_at.or(self.created_at)
    }

    /// Whether this is the rolling nightly release.
    #[must_use]
    pub fn is_nightly(&self) -> bool {
        self.tag_name.eq_ignore_ascii_case(NIGHTLY_TAG)
    }

    /// Version identifier for this release.
    ///
    /// The nightly tag is shared by every nightly build, so the release name is used when
    /// it holds something version-like.
    #[must_use]
    pub fn version(&self) -> String {
        if self.is_nightly() {
            if let Some(name) = self.name.as_deref() {
                let candidate = name.trim().trim_start_matches(['v', 'V']);
                if candidate.starts_with(|c: char| c.is_ascii_digit()) {
                    return candidate.to_string();
                }
            }
            return self.tag_name.clone();
        }
        self.tag_name.trim().trim_start_matches(['v', 'V']).to_string()
    }
}

/// An asset as returned by the GitHub API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitHubAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: Option<u64>,
    /// `sha256:<hex>` when GitHub computed a digest for the upload.
    #[serde(default)]
    pub digest: Option<String>,
}

impl GitHubAsset {
    /// The SHA-256 digest without its algorithm prefix, if one is published.
    #[must_use]
    pub fn sha256(&self) -> Option<String> {
        let digest = self.digest.as_deref()?.trim();
        let hex = digest.strip_prefix("sha256:").unwrap_or(digest);
        if hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            Some(hex.to_lowercase())
        } else {
            None
        }
    }

    /// A zero size means the index does not know it.
    #[must_use]
    pub fn declared_size(&self) -> Option<u64> {
        self.size.filter(|s| *s > 0)
    }
}
