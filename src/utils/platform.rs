//! Platform-specific helpers.

use anyhow::Result;
use std::path::PathBuf;

/// Whether we are running on Windows.
#[must_use]
pub const fn is_windows() -> bool {
    cfg!(windows)
}

/// Gets the home directory path for the current user.
pub fn get_home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| {
        let platform_help = if is_windows() {
            "On Windows: Check that the USERPROFILE environment variable is set"
        } else {
            "On Unix/Linux: Check that the HOME environment variable is set"
        };
        anyhow::anyhow!("Could not determine home directory.\n\n{platform_help}")
    })
}

/// File name of an executable on this platform (`ffmpeg` → `ffmpeg.exe` on Windows).
#[must_use]
pub fn executable_name(base: &str) -> String {
    if is_windows() {
        format!("{base}.exe")
    } else {
        base.to_string()
    }
}

/// Look a command up on `PATH`.
#[must_use]
pub fn find_on_path(cmd: &str) -> Option<PathBuf> {
    which::which(cmd).ok()
}
