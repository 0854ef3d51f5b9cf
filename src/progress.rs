//! Count-style progress bars for the long loops (segmentation, block-model equilibration).
//! Bars are opt-in so tests and batch runs stay quiet.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

fn count_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} {msg} {pos}/{len} [{bar:.cyan/blue}] {percent:>3}%  \
         it/s: {per_sec}  elapsed: {elapsed_precise}  eta: {eta_precise}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
}

/// Items processed out of `total`, labelled. `None` when progress is disabled.
pub fn count_progress(enabled: bool, total: u64, label: &str) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }
    let pb = ProgressBar::new(total);
    pb.set_style(count_style());
    if !label.is_empty() {
        pb.set_message(label.to_string());
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

#[inline]
pub fn tick(pb: &Option<ProgressBar>, delta: u64) {
    if let Some(pb) = pb {
        pb.inc(delta);
    }
}

pub fn finish(pb: Option<ProgressBar>, msg: impl Into<String>) {
    if let Some(pb) = pb {
        pb.finish_with_message(msg.into());
    }
}
