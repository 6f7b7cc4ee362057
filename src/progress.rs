//! Progress reporting for long scans.
//!
//! Draws an indicatif bar when enabled and logs every 5% step, so runs
//! without a terminal still leave a trace in the logs.

use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::{ProgressBar, ProgressStyle};

/// Number of log steps over a full scan (every 5%).
const LOG_STEPS: u64 = 20;

pub struct ScanProgress {
    label: &'static str,
    bar: ProgressBar,
    total: u64,
    done: AtomicU64,
    logged_step: AtomicU64,
}

impl ScanProgress {
    pub fn new(label: &'static str, total: u64, visible: bool) -> Self {
        let bar = if visible {
            let bar = ProgressBar::new(total);
            let style = ProgressStyle::with_template(
                "{msg:>10} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style.progress_chars("=> "));
            bar.set_message(label);
            bar
        } else {
            ProgressBar::hidden()
        };

        Self {
            label,
            bar,
            total,
            done: AtomicU64::new(0),
            logged_step: AtomicU64::new(0),
        }
    }

    pub fn inc(&self, delta: u64) {
        self.bar.inc(delta);
        let done = self.done.fetch_add(delta, Ordering::Relaxed) + delta;
        if self.total == 0 {
            return;
        }

        let step = done.min(self.total) * LOG_STEPS / self.total;
        if step > self.logged_step.fetch_max(step, Ordering::Relaxed) {
            log::info!(
                "{} progress: {:.1}% ({}/{})",
                self.label,
                done as f64 / self.total as f64 * 100.0,
                done,
                self.total
            );
        }
    }

    pub fn processed(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
        log::debug!("{} finished: {}/{}", self.label, self.processed(), self.total);
    }
}
