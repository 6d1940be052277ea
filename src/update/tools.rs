//! Knowledge about the bundled tools: which release assets install them, and how to
//! ask an installed binary for its version.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::release::{AssetDescriptor, Component, GitHubRelease};
use super::verification::CHECKSUM_MANIFESTS;
use crate::constants::{
    DEFAULT_APP_ASSET_PREFIX, DEFAULT_FFMPEG_BUILD_MARKER, TOOL_CACHE_CLEAR_TIMEOUT,
    TOOL_PROBE_TIMEOUT,
};
use crate::utils::platform::{executable_name, find_on_path};

/// Rules mapping release asset names onto components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRules {
    /// Lowercase prefix of the application bundle zip.
    pub app_prefix: String,
    /// Marker selecting the ffmpeg build flavour.
    pub ffmpeg_marker: String,
}

impl Default for AssetRules {
    fn default() -> Self {
        Self {
            app_prefix: DEFAULT_APP_ASSET_PREFIX.to_string(),
            ffmpeg_marker: DEFAULT_FFMPEG_BUILD_MARKER.to_string(),
        }
    }
}

impl AssetRules {
    pub fn new(app_prefix: impl Into<String>, ffmpeg_marker: impl Into<String>) -> Self {
        Self {
            app_prefix: app_prefix.into().to_lowercase(),
            ffmpeg_marker: ffmpeg_marker.into().to_lowercase(),
        }
    }

    /// The component an asset name installs, if any.
    #[must_use]
    pub fn classify(&self, name: &str) -> Option<Component> {
        let lower = name.to_lowercase();
        if name == executable_name("yt-dlp") {
            return Some(Component::YtDlp);
        }
        if lower.ends_with(".zip") {
            if lower.starts_with("ffmpeg") && lower.contains(&self.ffmpeg_marker) {
                return Some(Component::Ffmpeg);
            }
            if lower.starts_with(&self.app_prefix) {
                return Some(Component::Application);
            }
        }
        None
    }

    /// Classify every asset of a release read from a repository whose main
    /// component is `primary`.
    ///
    /// Tool repositories only contribute their own tool. The application's
    /// repository may also carry tool assets, which are then bundled with the
    /// application; when no asset matches the application prefix, the first
    /// other zip is taken as the bundle.
    #[must_use]
    pub fn classify_release(&self, release: &GitHubRelease, primary: Component) -> Vec<AssetDescriptor> {
        let mut assets: Vec<AssetDescriptor> = Vec::new();

        for asset in &release.assets {
            let Some(component) = self.classify(&asset.name) else {
                continue;
            };
            if primary.is_tool() && component != primary {
                continue;
            }
            if assets.iter().any(|a| a.component == component) {
                debug!(asset = %asset.name, %component, "Ignoring additional asset for component");
                continue;
            }
            assets.push(AssetDescriptor {
                name: asset.name.clone(),
                url: asset.browser_download_url.clone(),
                size: asset.declared_size(),
                checksum: asset.sha256(),
                component,
            });
        }

        if primary == Component::Application && !assets.iter().any(|a| a.component == primary) {
            let fallback = release.assets.iter().find(|a| {
                a.name.to_lowercase().ends_with(".zip") && self.classify(&a.name).is_none()
            });
            if let Some(asset) = fallback {
                debug!(asset = %asset.name, "Using first zip asset as application bundle");
                assets.push(AssetDescriptor {
                    name: asset.name.clone(),
                    url: asset.browser_download_url.clone(),
                    size: asset.declared_size(),
                    checksum: asset.sha256(),
                    component: Component::Application,
                });
            }
        }

        assets.sort_by_key(|a| a.component);
        assets
    }
}

/// Whether an asset is a checksum manifest rather than an installable file.
#[must_use]
pub fn is_checksum_manifest(name: &str) -> bool {
    CHECKSUM_MANIFESTS.iter().any(|m| m.eq_ignore_ascii_case(name))
        || name.to_lowercase().ends_with(".sha256")
}

/// The leading dotted-numeric part of a version token
/// (`7.0.2-essentials_build-www.gyan.dev` → `7.0.2`).
fn leading_version(token: &str) -> Option<String> {
    let token = token.trim_start_matches(['v', 'V']);
    let end = token.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(token.len());
    let version = token[..end].trim_end_matches('.');
    if version.is_empty() {
        None
    } else {
        Some(version.to_string())
    }
}

/// Parse `yt-dlp --version` output.
#[must_use]
pub fn parse_ytdlp_version(output: &str) -> Option<String> {
    output.split_whitespace().next().map(str::to_string)
}

/// Parse `ffmpeg -version` output (`ffmpeg version 7.0.2-essentials... Copyright`).
#[must_use]
pub fn parse_ffmpeg_version(output: &str) -> Option<String> {
    let first_line = output.lines().next()?;
    let mut words = first_line.split_whitespace();
    while let Some(word) = words.next() {
        if word == "version" {
            return words.next().and_then(leading_version);
        }
    }
    None
}

async fn run_with_timeout(binary: &Path, arg: &str, timeout: Duration) -> Option<String> {
    let mut command = Command::new(binary);
    command.arg(arg).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::null()).kill_on_drop(true);

    match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(Ok(output)) => {
            debug!(binary = %binary.display(), status = %output.status, "Tool exited unsuccessfully");
            None
        }
        Ok(Err(e)) => {
            debug!(binary = %binary.display(), error = %e, "Failed to run tool");
            None
        }
        Err(_) => {
            warn!(binary = %binary.display(), "Tool did not answer within {:?}", timeout);
            None
        }
    }
}

/// Ask an installed tool for its version. `None` when it is missing or doesn't answer.
pub async fn query_version(component: Component, binary: &Path) -> Option<String> {
    if !binary.is_file() {
        return None;
    }
    match component {
        Component::YtDlp => {
            run_with_timeout(binary, "--version", TOOL_PROBE_TIMEOUT)
                .await
                .and_then(|out| parse_ytdlp_version(&out))
        }
        Component::Ffmpeg => {
            run_with_timeout(binary, "-version", TOOL_PROBE_TIMEOUT)
                .await
                .and_then(|out| parse_ffmpeg_version(&out))
        }
        Component::Application => None,
    }
}

/// Clear yt-dlp's cache after it was replaced. Failures are only logged.
pub async fn clear_ytdlp_cache(binary: &Path) {
    if !binary.is_file() {
        return;
    }
    if run_with_timeout(binary, "--rm-cache-dir", TOOL_CACHE_CLEAR_TIMEOUT).await.is_some() {
        info!("Cleared yt-dlp cache");
    }
}

/// An ffmpeg found on `PATH`. It is reported but never modified.
#[must_use]
pub fn system_ffmpeg() -> Option<PathBuf> {
    find_on_path("ffmpeg")
}
