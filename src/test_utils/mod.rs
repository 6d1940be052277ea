//! Test utilities for ytconv
//!
//! Helpers shared by unit and integration tests: logging setup, release index
//! fixtures, zip builders, and install-tree snapshots.
//!
//! # Example
//!
//! ```rust,no_run
//! use ytconv::test_utils::{ReleaseFixture, zip_bytes};
//!
//! let bundle = zip_bytes(&[("YoutubeConverter/app.bin", b"v2")]);
//! let release = ReleaseFixture::new("v1.1.0")
//!     .published("2024-07-01T00:00:00Z")
//!     .asset("http://127.0.0.1:9", "YoutubeConverter-1.1.0.zip", &bundle);
//! let json = release.to_json();
//! ```

pub mod fixtures;

pub use fixtures::{ReleaseFixture, sha256_hex, snapshot_tree, write_install, zip_bytes};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, else `RUST_LOG`; with neither, tests stay silent.
///
/// ```bash
/// RUST_LOG=ytconv=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
