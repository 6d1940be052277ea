//! Fixtures for release index payloads, archives, and install trees.

use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// An in-memory zip holding `entries` (name, content).
///
/// # Panics
///
/// Panics if the archive cannot be written, which only happens on invalid names.
#[must_use]
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().unix_permissions(0o755);
    for (name, content) in entries {
        writer.start_file(*name, options).expect("start zip entry");
        writer.write_all(content).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// Builder for one release in the GitHub API's JSON shape.
#[derive(Debug, Clone)]
pub struct ReleaseFixture {
    tag: String,
    name: Option<String>,
    draft: bool,
    prerelease: bool,
    published_at: Option<String>,
    assets: Vec<Value>,
}

impl ReleaseFixture {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            name: None,
            draft: false,
            prerelease: false,
            published_at: None,
            assets: Vec::new(),
        }
    }

    /// URL path an asset of this release is served under.
    #[must_use]
    pub fn download_path(tag: &str, asset: &str) -> String {
        format!("/download/{tag}/{asset}")
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub const fn draft(mut self) -> Self {
        self.draft = true;
        self
    }

    #[must_use]
    pub const fn prerelease(mut self) -> Self {
        self.prerelease = true;
        self
    }

    #[must_use]
    pub fn published(mut self, timestamp: impl Into<String>) -> Self {
        self.published_at = Some(timestamp.into());
        self
    }

    /// An asset served from `base`, with the digest and size of `content`.
    #[must_use]
    pub fn asset(self, base: &str, name: &str, content: &[u8]) -> Self {
        let digest = sha256_hex(content);
        self.asset_with_digest(base, name, content.len() as u64, &digest)
    }

    /// An asset with an explicit digest, e.g. one that doesn't match its content.
    #[must_use]
    pub fn asset_with_digest(mut self, base: &str, name: &str, size: u64, digest: &str) -> Self {
        self.assets.push(json!({
            "name": name,
            "browser_download_url": format!("{base}{}", Self::download_path(&self.tag, name)),
            "size": size,
            "digest": format!("sha256:{digest}"),
        }));
        self
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "tag_name": self.tag,
            "name": self.name,
            "draft": self.draft,
            "prerelease": self.prerelease,
            "published_at": self.published_at,
            "created_at": self.published_at,
            "assets": self.assets,
        })
    }
}

/// Write `files` (relative path, content) under `root`.
///
/// # Panics
///
/// Panics on I/O errors.
pub fn write_install(root: &Path, files: &[(&str, &[u8])]) {
    for (relative, content) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture dir");
        }
        std::fs::write(&path, content).expect("write fixture file");
    }
}

/// Every regular file under `root` with its content, skipping the updater's own
/// bookkeeping (`.update-staging`, `.update-rollback`, `.update.lock`).
///
/// # Panics
///
/// Panics on I/O errors.
#[must_use]
pub fn snapshot_tree(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() != 1 || !e.file_name().to_string_lossy().starts_with(".update"))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(root).expect("under root").to_path_buf();
            let content = std::fs::read(e.path()).expect("read snapshot file");
            (relative, content)
        })
        .collect()
}
