//! Global constants used throughout the ytconv codebase.
//!
//! Timeouts, retry parameters, well-known file names and remote defaults that are
//! shared across the update pipeline and the CLI.

use std::time::Duration;

/// The fixed tag under which nightly builds are published.
///
/// Every nightly publish overwrites the previous assets under this tag, so the tag
/// itself carries no ordering information.
pub const NIGHTLY_TAG: &str = "nightly";

/// Default base URL of the release index (GitHub REST API).
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Repository publishing the application's own releases.
pub const DEFAULT_APP_REPO: &str = "ytconv/YoutubeConverter";

/// Lowercase prefix of the application bundle asset.
pub const DEFAULT_APP_ASSET_PREFIX: &str = "youtubeconverter";

/// Repository publishing ffmpeg essentials builds.
pub const DEFAULT_FFMPEG_REPO: &str = "GyanD/codexffmpeg";

/// Marker selecting the ffmpeg build flavour among a release's archives.
pub const DEFAULT_FFMPEG_BUILD_MARKER: &str = "essentials";

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("ytconv/", env!("CARGO_PKG_VERSION"), " (self-update)");

/// Number of releases requested per index page.
pub const RELEASES_PAGE_SIZE: u32 = 30;

/// Bound on establishing a connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default bound on a single request, and on the gap between two body chunks.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default number of retries after the first failed attempt.
pub const DEFAULT_MAX_RETRIES: usize = 4;

/// First backoff delay between retries.
pub const STARTING_BACKOFF_DELAY_MS: u64 = 250;

/// Cap on the backoff delay between retries.
pub const MAX_BACKOFF_DELAY_MS: u64 = 8_000;

/// Timeout for running a bundled tool to query its version.
pub const TOOL_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for yt-dlp's cache clearing after an update.
pub const TOOL_CACHE_CLEAR_TIMEOUT: Duration = Duration::from_secs(15);

/// Default interval between automatic update checks (24 hours).
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 86_400;

/// Persisted installed-state record, relative to the install root.
pub const STATE_FILE_NAME: &str = "installed.json";

/// Legacy plain-text application version marker, relative to the install root.
pub const LEGACY_VERSION_FILE: &str = "version.txt";

/// Parent directory of per-run staging areas.
pub const STAGING_DIR_NAME: &str = ".update-staging";

/// Parent directory of rollback journals and backups.
pub const ROLLBACK_DIR_NAME: &str = ".update-rollback";

/// Advisory lock file guarding the install tree across processes.
pub const LOCK_FILE_NAME: &str = ".update.lock";

/// Suffix of an executable staged next to the running binary.
pub const PENDING_EXE_SUFFIX: &str = "new";

/// Files owned by the user that an application bundle must never overwrite.
pub const PROTECTED_FILES: &[&str] = &["settings.json", "config.json", "history.json"];
