//! Decides whether a resolved release should replace what is installed.
//!
//! Release and prerelease candidates are ordered by version; nightly candidates share
//! one tag and are ordered by publish time instead. A candidate from a different channel
//! than the installed build is always eligible, which is how switching channels (even
//! to an older build) works. A strictly older build on the same channel never is.

use std::cmp::Ordering;
use std::fmt;

use super::release::ReleaseDescriptor;
use super::state::ComponentRecord;
use super::version::compare_versions;

/// Outcome of comparing a candidate against the installed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Nothing is installed for the component.
    NotInstalled,
    /// The candidate is strictly newer on the same channel.
    Newer,
    /// The candidate comes from a different channel than the installed build.
    ChannelSwitch,
    /// The candidate is the installed build.
    Same,
    /// The candidate is strictly older on the same channel.
    Older,
    /// The two cannot be ordered (unparsable version or missing publish time).
    Unordered,
}

impl Eligibility {
    /// Whether the candidate should be applied on the standard update path.
    #[must_use]
    pub const fn is_eligible(&self) -> bool {
        matches!(self, Self::NotInstalled | Self::Newer | Self::ChannelSwitch)
    }
}

impl fmt::Display for Eligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotInstalled => "not installed",
            Self::Newer => "newer",
            Self::ChannelSwitch => "channel switch",
            Self::Same => "up to date",
            Self::Older => "older",
            Self::Unordered => "unordered",
        })
    }
}

/// Version and timestamp ordering rules.
pub struct UpdateComparator;

impl UpdateComparator {
    /// Compare a candidate release against the installed record of its component.
    #[must_use]
    pub fn evaluate(installed: &ComponentRecord, candidate: &ReleaseDescriptor) -> Eligibility {
        let Some(installed_version) = installed.version.as_deref() else {
            return Eligibility::NotInstalled;
        };

        if let Some(installed_channel) = installed.channel {
            if installed_channel != candidate.channel {
                return Eligibility::ChannelSwitch;
            }
        }

        let ordering = if candidate.channel.orders_by_timestamp() {
            match (candidate.published_at, installed.published_at) {
                (None, _) => None,
                (Some(_), None) => Some(Ordering::Greater),
                (Some(candidate_at), Some(installed_at)) => Some(candidate_at.cmp(&installed_at)),
            }
        } else {
            compare_versions(&candidate.version, installed_version)
        };

        match ordering {
            Some(Ordering::Greater) => Eligibility::Newer,
            Some(Ordering::Equal) => Eligibility::Same,
            Some(Ordering::Less) => Eligibility::Older,
            None => Eligibility::Unordered,
        }
    }

    /// Shorthand for `evaluate(..).is_eligible()`.
    #[must_use]
    pub fn is_eligible(installed: &ComponentRecord, candidate: &ReleaseDescriptor) -> bool {
        Self::evaluate(installed, candidate).is_eligible()
    }

    /// Whether installing `target` would move the component to an older version.
    #[must_use]
    pub fn is_downgrade(installed: &ComponentRecord, target: &str) -> bool {
        installed
            .version
            .as_deref()
            .and_then(|current| compare_versions(target, current))
            .is_some_and(|o| o == Ordering::Less)
    }
}
