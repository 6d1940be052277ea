//! Where each component lives inside the install root.

use std::path::{Component as PathComponent, Path, PathBuf};

use super::release::Component;
use crate::constants::{
    LEGACY_VERSION_FILE, LOCK_FILE_NAME, PROTECTED_FILES, ROLLBACK_DIR_NAME, STAGING_DIR_NAME,
    STATE_FILE_NAME,
};
use crate::utils::executable_name;

/// Paths of the install tree.
///
/// ```text
/// <root>/                  application bundle
/// <root>/bin/yt-dlp
/// <root>/ffmpeg/ffmpeg, ffprobe
/// <root>/installed.json
/// <root>/.update-staging/
/// <root>/.update-rollback/
/// <root>/.update.lock
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.root.join(STATE_FILE_NAME)
    }

    #[must_use]
    pub fn legacy_version_file(&self) -> PathBuf {
        self.root.join(LEGACY_VERSION_FILE)
    }

    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR_NAME)
    }

    #[must_use]
    pub fn rollback_dir(&self) -> PathBuf {
        self.root.join(ROLLBACK_DIR_NAME)
    }

    #[must_use]
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILE_NAME)
    }

    #[must_use]
    pub fn ytdlp_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    #[must_use]
    pub fn ytdlp_path(&self) -> PathBuf {
        self.ytdlp_dir().join(executable_name("yt-dlp"))
    }

    #[must_use]
    pub fn ffmpeg_dir(&self) -> PathBuf {
        self.root.join("ffmpeg")
    }

    #[must_use]
    pub fn ffmpeg_path(&self) -> PathBuf {
        self.ffmpeg_dir().join(executable_name("ffmpeg"))
    }

    #[must_use]
    pub fn ffprobe_path(&self) -> PathBuf {
        self.ffmpeg_dir().join(executable_name("ffprobe"))
    }

    /// Directory a component's files are installed into.
    #[must_use]
    pub fn component_dir(&self, component: Component) -> PathBuf {
        match component {
            Component::Application => self.root.clone(),
            Component::YtDlp => self.ytdlp_dir(),
            Component::Ffmpeg => self.ffmpeg_dir(),
        }
    }

    /// Executables a tool component must provide after install.
    #[must_use]
    pub fn required_executables(&self, component: Component) -> Vec<PathBuf> {
        match component {
            Component::Application => Vec::new(),
            Component::YtDlp => vec![self.ytdlp_path()],
            Component::Ffmpeg => vec![self.ffmpeg_path(), self.ffprobe_path()],
        }
    }

    /// Whether a path relative to the root must never be written by a bundle.
    ///
    /// Covers the updater's own bookkeeping, user settings files, and the tool
    /// directories, which are owned by their own components.
    #[must_use]
    pub fn is_protected(&self, relative: &Path) -> bool {
        let Some(PathComponent::Normal(first)) = relative.components().next() else {
            return true;
        };
        let first = first.to_string_lossy();
        let reserved = [
            STATE_FILE_NAME,
            STAGING_DIR_NAME,
            ROLLBACK_DIR_NAME,
            LOCK_FILE_NAME,
            "bin",
            "ffmpeg",
        ];

        if relative.components().count() == 1 && PROTECTED_FILES.contains(&first.as_ref()) {
            return true;
        }
        reserved.iter().any(|r| first.eq_ignore_ascii_case(r))
    }
}
