//! ytconv - self-updating shell for YoutubeConverter
//!
//! Keeps a YoutubeConverter installation and its two bundled tools (yt-dlp and
//! ffmpeg/ffprobe) current against a remote release index, without ever leaving the
//! installation half-replaced.
//!
//! # Architecture Overview
//!
//! - A **channel** (`release`, `prerelease`, `nightly`) picks one candidate from the
//!   release index.
//! - The candidate is **compared** with the installed state: version order for release
//!   channels, publish time for nightly. A channel switch is always eligible; a
//!   downgrade never happens implicitly.
//! - Assets are **fetched** into a per-run staging area with checksum verification
//!   and retried with exponential backoff on transient failures.
//! - The **applier** swaps files one at a time with temp-and-rename, journaling a
//!   backup of each, and commits the installed state last. Any failure rolls every
//!   file back.
//!
//! # Core Modules
//!
//! - [`update`] - Resolve, compare, fetch, apply, and the orchestrator tying them together
//! - [`core`] - Error taxonomy and user-facing error rendering
//! - [`config`] - User configuration (`~/.ytconv/config.toml`)
//! - [`cli`] - Command-line interface
//! - [`utils`] - Filesystem, platform, and progress helpers
//!
//! # Install Layout
//!
//! ```text
//! <root>/                   application bundle
//! <root>/bin/yt-dlp         yt-dlp
//! <root>/ffmpeg/ffmpeg      ffmpeg and ffprobe
//! <root>/installed.json     installed state
//! <root>/.update-staging/   downloads in progress
//! <root>/.update-rollback/  rollback journals
//! <root>/.update.lock       cross-process lock
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod update;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
