use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::core::{Result, UpdateError};

/// Names of published checksum manifests covering every asset of a release.
pub const CHECKSUM_MANIFESTS: &[&str] = &["SHA2-256SUMS", "SHA256SUMS", "checksums.txt"];

/// SHA-256 verification of staged assets.
///
/// Checksums are compared as lowercase hex; a `sha256:` prefix on either side is
/// ignored.
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Normalize a published checksum to bare lowercase hex.
    #[must_use]
    pub fn normalize(checksum: &str) -> String {
        let trimmed = checksum.trim();
        trimmed.strip_prefix("sha256:").unwrap_or(trimmed).to_lowercase()
    }

    /// Compute the SHA-256 of a file, streaming it in blocks.
    pub fn compute_sha256(file_path: &Path) -> Result<String> {
        debug!("Computing SHA256 checksum for: {:?}", file_path);

        let mut file = std::fs::File::open(file_path)?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    /// Compare a computed digest against the expected one.
    pub fn check(asset: &str, expected: &str, actual: &str) -> Result<()> {
        let expected = Self::normalize(expected);
        let actual = Self::normalize(actual);
        if expected != actual {
            return Err(UpdateError::Integrity {
                asset: asset.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Verify a file on disk against an expected checksum.
    pub fn verify_file(file_path: &Path, asset: &str, expected: &str) -> Result<()> {
        let actual = Self::compute_sha256(file_path)?;
        Self::check(asset, expected, &actual)
    }

    /// Find the checksum of `asset_name` in a `sha256sum`-style manifest.
    ///
    /// Lines are `<hex>  <filename>` or `<hex> *<filename>`; only an exact filename
    /// match counts, so `yt-dlp` never picks up `yt-dlp_linux`. A single bare hex
    /// digest (the format of `<asset>.sha256` files) also matches.
    #[must_use]
    pub fn parse_manifest(content: &str, asset_name: &str) -> Option<String> {
        let mut bare = None;
        for line in content.lines() {
            let mut parts = line.split_whitespace();
            let Some(checksum) = parts.next() else {
                continue;
            };
            if !is_sha256_hex(checksum) {
                continue;
            }

            match parts.next() {
                Some(filename) => {
                    let filename = filename.trim_start_matches('*');
                    let filename = filename.rsplit('/').next().unwrap_or(filename);
                    if filename == asset_name {
                        return Some(checksum.to_lowercase());
                    }
                }
                None => bare = Some(checksum.to_lowercase()),
            }
        }
        bare
    }
}

fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit())
}
