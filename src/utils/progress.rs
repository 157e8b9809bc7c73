// src/utils/progress.rs

use indicatif::{ProgressBar, ProgressStyle};

/// Standard bar for the resolve and import phases. Hidden automatically when
/// the run has nothing to show (zero-length phases).
pub fn phase_bar(len: u64, label: &str) -> ProgressBar {
    if len == 0 {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar.set_message(label.to_string());
    bar
}
