//! Progress indicators for downloads.
//!
//! Progress output is hidden when stderr is not a terminal or when
//! `YTCONV_NO_PROGRESS` is set, so scripted runs and tests stay quiet.

use indicatif::{MultiProgress, ProgressBar as IndicatifBar, ProgressStyle};
use std::io::IsTerminal;

fn is_progress_disabled() -> bool {
    std::env::var_os("YTCONV_NO_PROGRESS").is_some() || !std::io::stderr().is_terminal()
}

fn download_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸━")
}

/// One bar per downloaded asset, stacked in a shared container.
#[derive(Clone)]
pub struct DownloadProgress {
    multi: MultiProgress,
    hidden: bool,
}

impl DownloadProgress {
    #[must_use]
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            hidden: is_progress_disabled(),
        }
    }

    /// Add a bar for an asset of the given size (0 when unknown).
    #[must_use]
    pub fn add(&self, name: &str, total: u64) -> IndicatifBar {
        if self.hidden {
            return IndicatifBar::hidden();
        }
        let bar = self.multi.add(IndicatifBar::new(total));
        bar.set_style(download_style());
        bar.set_prefix(name.to_string());
        bar
    }
}

impl Default for DownloadProgress {
    fn default() -> Self {
        Self::new()
    }
}
