//! Cross-platform utilities and helpers
//!
//! - [`fs`] - File system operations with atomic writes and replacement
//! - [`platform`] - Platform-specific helpers and path resolution
//! - [`progress`] - Download progress bars

pub mod fs;
pub mod platform;
pub mod progress;

pub use fs::{atomic_replace, atomic_write, ensure_dir};
pub use platform::{executable_name, get_home_dir, is_windows};
pub use progress::DownloadProgress;
