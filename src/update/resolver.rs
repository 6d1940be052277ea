//! Resolves a channel to a concrete release from the remote index.
//!
//! | Channel | Selection |
//! |---------|-----------|
//! | release | newest entry that is neither draft nor prerelease |
//! | prerelease | newest entry flagged draft or prerelease |
//! | nightly | the entry under the fixed `nightly` tag |
//!
//! "Newest" is by publish time (creation time for drafts), never by list position.
//! A missing repository, tag, or matching entry is [`UpdateError::NotFound`] and is
//! never retried; transport failures are retried under the [`RetryPolicy`].

use tracing::{debug, info, instrument};

use super::channel::{Channel, ToolBranch};
use super::http::HttpClient;
use super::release::{Component, GitHubRelease, ReleaseDescriptor};
use super::retry::RetryPolicy;
use super::tools::{AssetRules, is_checksum_manifest};
use super::verification::ChecksumVerifier;
use crate::constants::{NIGHTLY_TAG, RELEASES_PAGE_SIZE};
use crate::core::{Result, UpdateError};

/// Looks up releases in the index and normalizes them into [`ReleaseDescriptor`]s.
#[derive(Debug, Clone)]
pub struct ChannelResolver {
    http: HttpClient,
    retry: RetryPolicy,
    rules: AssetRules,
}

impl ChannelResolver {
    #[must_use]
    pub const fn new(http: HttpClient, retry: RetryPolicy, rules: AssetRules) -> Self {
        Self {
            http,
            retry,
            rules,
        }
    }

    /// Pick the entry a channel selects from a list of releases.
    #[must_use]
    pub fn select(releases: &[GitHubRelease], channel: Channel) -> Option<&GitHubRelease> {
        match channel {
            Channel::Nightly => releases.iter().find(|r| r.is_nightly()),
            Channel::Release => releases
                .iter()
                .filter(|r| !r.draft && !r.prerelease && !r.is_nightly())
                .max_by_key(|r| r.timestamp()),
            Channel::Prerelease => releases
                .iter()
                .filter(|r| (r.draft || r.prerelease) && !r.is_nightly())
                .max_by_key(|r| r.timestamp()),
        }
    }

    /// Resolve `channel` in `repo`, whose main component is `primary`.
    #[instrument(skip(self))]
    pub async fn resolve(
        &self,
        repo: &str,
        primary: Component,
        channel: Channel,
    ) -> Result<ReleaseDescriptor> {
        let release = if channel == Channel::Nightly {
            self.release_by_tag(repo, NIGHTLY_TAG).await?
        } else {
            let releases = self.list_releases(repo).await?;
            Self::select(&releases, channel)
                .cloned()
                .ok_or_else(|| UpdateError::not_found(format!("channel '{channel}' in {repo}")))?
        };

        let descriptor = self.describe(&release, repo, primary, channel).await?;
        info!(
            component = %primary,
            version = %descriptor.version,
            %channel,
            "Resolved release"
        );
        Ok(descriptor)
    }

    /// Resolve the newest yt-dlp build of a branch.
    ///
    /// Each branch is its own repository published with the release rule; the
    /// descriptor carries the branch's channel.
    pub async fn resolve_ytdlp(&self, branch: ToolBranch) -> Result<ReleaseDescriptor> {
        let mut descriptor = self.resolve(branch.repo(), Component::YtDlp, Channel::Release).await?;
        descriptor.channel = branch.channel();
        Ok(descriptor)
    }

    /// Find the release for an exact version, for explicit downgrades.
    pub async fn resolve_version(
        &self,
        repo: &str,
        primary: Component,
        version: &str,
    ) -> Result<ReleaseDescriptor> {
        let bare = version.trim().trim_start_matches(['v', 'V']);
        let mut last_error = UpdateError::not_found(format!("version {bare} in {repo}"));

        for tag in [format!("v{bare}"), bare.to_string()] {
            match self.release_by_tag(repo, &tag).await {
                Ok(release) => {
                    let channel = if release.is_nightly() {
                        Channel::Nightly
                    } else if release.draft || release.prerelease {
                        Channel::Prerelease
                    } else {
                        Channel::Release
                    };
                    return self.describe(&release, repo, primary, channel).await;
                }
                Err(UpdateError::NotFound {
                    ..
                }) => continue,
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }

    async fn list_releases(&self, repo: &str) -> Result<Vec<GitHubRelease>> {
        let url = format!(
            "{}/repos/{repo}/releases?per_page={RELEASES_PAGE_SIZE}",
            self.http.api_base()
        );
        let subject = format!("releases of {repo}");
        self.retry.run(&subject, || self.http.get_json(&url, &subject)).await
    }

    async fn release_by_tag(&self, repo: &str, tag: &str) -> Result<GitHubRelease> {
        let url = format!("{}/repos/{repo}/releases/tags/{tag}", self.http.api_base());
        let subject = format!("tag '{tag}' in {repo}");
        self.retry.run(&subject, || self.http.get_json(&url, &subject)).await
    }

    /// Normalize a release, filling missing checksums from a published manifest.
    async fn describe(
        &self,
        release: &GitHubRelease,
        repo: &str,
        primary: Component,
        channel: Channel,
    ) -> Result<ReleaseDescriptor> {
        let mut assets = self.rules.classify_release(release, primary);
        if !assets.iter().any(|a| a.component == primary) {
            return Err(UpdateError::not_found(format!(
                "an installable {primary} asset in {repo} {}",
                release.tag_name
            )));
        }

        let manifests: Vec<_> =
            release.assets.iter().filter(|a| is_checksum_manifest(&a.name)).collect();

        for asset in assets.iter_mut().filter(|a| a.checksum.is_none()) {
            let per_asset = format!("{}.sha256", asset.name).to_lowercase();
            let manifest = manifests
                .iter()
                .find(|m| m.name.to_lowercase() == per_asset)
                .or_else(|| manifests.iter().find(|m| !m.name.to_lowercase().ends_with(".sha256")));
            let Some(manifest) = manifest else {
                continue;
            };

            let url = manifest.browser_download_url.clone();
            let subject = manifest.name.clone();
            let content = self.retry.run(&subject, || self.http.get_text(&url, &subject)).await?;
            asset.checksum = ChecksumVerifier::parse_manifest(&content, &asset.name);
            debug!(
                asset = %asset.name,
                manifest = %manifest.name,
                found = asset.checksum.is_some(),
                "Looked up checksum in manifest"
            );
        }

        Ok(ReleaseDescriptor {
            version: release.version(),
            tag: release.tag_name.clone(),
            channel,
            published_at: release.timestamp(),
            draft: release.draft,
            prerelease: release.prerelease,
            assets,
            source: repo.to_string(),
        })
    }
}
