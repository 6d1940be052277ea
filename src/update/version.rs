//! Ordering of release version identifiers.
//!
//! Application releases use semantic versions (`1.3.0`, `v1.4.0-beta.1`), while the
//! upstream tools publish date-like identifiers (`2024.08.06`, `2024.08.07.232736`)
//! that are not valid semver because of leading zeros. Both are compared field by
//! field numerically; string comparison is never used.

use std::cmp::Ordering;
use std::fmt;

/// A parsed, orderable version identifier.
///
/// Equality follows the ordering: build metadata is ignored, and `1.2.0` equals the
/// dotted `1.2` or `1.2.0.0`.
#[derive(Debug, Clone)]
pub enum ReleaseVersion {
    /// A valid semantic version.
    Semantic(semver::Version),
    /// Purely numeric dot-separated fields.
    Dotted(Vec<u64>),
}

impl ReleaseVersion {
    /// Parse an identifier, accepting an optional leading `v`.
    ///
    /// Returns `None` for identifiers that carry no ordering, such as the
    /// rolling `nightly` tag.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let trimmed = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
        if trimmed.is_empty() {
            return None;
        }

        if let Ok(version) = semver::Version::parse(trimmed) {
            return Some(Self::Semantic(version));
        }

        let fields: Option<Vec<u64>> =
            trimmed.split('.').map(|field| field.parse::<u64>().ok()).collect();
        fields.filter(|f| !f.is_empty()).map(Self::Dotted)
    }

    fn numeric_fields(&self) -> Vec<u64> {
        match self {
            Self::Semantic(v) => vec![v.major, v.minor, v.patch],
            Self::Dotted(fields) => fields.clone(),
        }
    }
}

impl Ord for ReleaseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        if let (Self::Semantic(a), Self::Semantic(b)) = (self, other) {
            return a.cmp_precedence(b);
        }

        let a = self.numeric_fields();
        let b = other.numeric_fields();
        let len = a.len().max(b.len());
        for i in 0..len {
            let left = a.get(i).copied().unwrap_or(0);
            let right = b.get(i).copied().unwrap_or(0);
            match left.cmp(&right) {
                Ordering::Equal => {}
                non_eq => return non_eq,
            }
        }

        // 1.4.0-beta.1 still orders below 1.4.0 when compared with a dotted identifier
        match (self, other) {
            (Self::Semantic(v), Self::Dotted(_)) if !v.pre.is_empty() => Ordering::Less,
            (Self::Dotted(_), Self::Semantic(v)) if !v.pre.is_empty() => Ordering::Greater,
            _ => Ordering::Equal,
        }
    }
}

impl PartialEq for ReleaseVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ReleaseVersion {}

impl PartialOrd for ReleaseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Semantic(v) => write!(f, "{v}"),
            Self::Dotted(fields) => {
                let parts: Vec<String> = fields.iter().map(u64::to_string).collect();
                f.write_str(&parts.join("."))
            }
        }
    }
}

/// Compare two raw identifiers; `None` when either side cannot be ordered.
#[must_use]
pub fn compare_versions(left: &str, right: &str) -> Option<Ordering> {
    Some(ReleaseVersion::parse(left)?.cmp(&ReleaseVersion::parse(right)?))
}
