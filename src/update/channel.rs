//! Update channels and yt-dlp branches.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::UpdateError;

/// User-selected trust tier controlling which releases are eligible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Stable releases only: neither draft nor prerelease.
    #[default]
    Release,
    /// The newest draft or prerelease build.
    Prerelease,
    /// The rolling build published under the fixed nightly tag.
    Nightly,
}

impl Channel {
    /// All channels, in order of decreasing stability.
    pub const ALL: [Self; 3] = [Self::Release, Self::Prerelease, Self::Nightly];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Prerelease => "prerelease",
            Self::Nightly => "nightly",
        }
    }

    /// Whether candidates on this channel are ordered by publish time
    /// instead of by version identifier.
    #[must_use]
    pub const fn orders_by_timestamp(&self) -> bool {
        matches!(self, Self::Nightly)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "release" | "stable" => Ok(Self::Release),
            "prerelease" | "pre-release" | "beta" => Ok(Self::Prerelease),
            "nightly" => Ok(Self::Nightly),
            _ => Err(UpdateError::InvalidChannel {
                value: s.to_string(),
            }),
        }
    }
}

/// Upstream build branch of yt-dlp.
///
/// Each branch is published from its own repository; the branch maps onto a
/// [`Channel`] so that switching branches counts as a channel switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolBranch {
    #[default]
    Stable,
    Nightly,
    Master,
}

impl ToolBranch {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Nightly => "nightly",
            Self::Master => "master",
        }
    }

    /// Repository (`owner/name`) publishing this branch.
    #[must_use]
    pub const fn repo(&self) -> &'static str {
        match self {
            Self::Stable => "yt-dlp/yt-dlp",
            Self::Nightly => "yt-dlp/yt-dlp-nightly-builds",
            Self::Master => "yt-dlp/yt-dlp-master-builds",
        }
    }

    /// Channel recorded for builds taken from this branch.
    #[must_use]
    pub const fn channel(&self) -> Channel {
        match self {
            Self::Stable => Channel::Release,
            Self::Nightly => Channel::Nightly,
            Self::Master => Channel::Prerelease,
        }
    }
}

impl fmt::Display for ToolBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolBranch {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stable" | "release" => Ok(Self::Stable),
            "nightly" => Ok(Self::Nightly),
            "master" => Ok(Self::Master),
            _ => Err(UpdateError::InvalidChannel {
                value: s.to_string(),
            }),
        }
    }
}
