//! Progress reporting utilities using indicatif.
//!
//! [`Progress`] implements [`ProgressCallback`] with one bar per phase:
//! a spinner while volumes are scanned, then bars for hashing and relinking.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Progress callback for the phases of a run.
///
/// Phase names are `"scanning"`, `"hashing"` and `"relinking"`.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts. `total` is 0 when unknown.
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called for each item processed (`current` is 1-based).
    ///
    /// Hashing calls this from worker threads, so `current` may arrive out
    /// of order.
    fn on_progress(&self, current: usize, path: &str);

    /// Called once per finished item, successful or not, with its size.
    fn on_item_completed(&self, _bytes: u64) {}

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);
}

/// Progress reporter using indicatif.
pub struct Progress {
    multi: MultiProgress,
    scanning: Mutex<Option<ProgressBar>>,
    hashing: Mutex<Option<ProgressBar>>,
    relinking: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

fn slot(m: &Mutex<Option<ProgressBar>>) -> MutexGuard<'_, Option<ProgressBar>> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// ```
    /// use crosslink::progress::Progress;
    ///
    /// let progress = Progress::new(true);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            scanning: Mutex::new(None),
            hashing: Mutex::new(None),
            relinking: Mutex::new(None),
            quiet,
        }
    }

    fn scanning_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} files")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    fn bar_style(color: &str) -> ProgressStyle {
        ProgressStyle::with_template(&format!(
            "[{{elapsed_precise}}] [{{bar:40.{color}/blue}}] {{pos}}/{{len}} ({{percent}}%) {{msg}} (ETA: {{eta}})"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn slot_for(&self, phase: &str) -> Option<&Mutex<Option<ProgressBar>>> {
        match phase {
            "scanning" => Some(&self.scanning),
            "hashing" => Some(&self.hashing),
            "relinking" => Some(&self.relinking),
            _ => None,
        }
    }

    fn active(&self) -> Option<ProgressBar> {
        [&self.relinking, &self.hashing, &self.scanning]
            .into_iter()
            .find_map(|m| slot(m).clone())
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }
        let Some(target) = self.slot_for(phase) else {
            return;
        };

        let pb = if phase == "scanning" {
            let pb = self.multi.add(ProgressBar::new_spinner());
            pb.set_style(Self::scanning_style());
            pb.set_message("Scanning volumes");
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        } else {
            let pb = self.multi.add(ProgressBar::new(total as u64));
            let (color, message) = if phase == "hashing" {
                ("cyan", "Hashing")
            } else {
                ("green", "Relinking")
            };
            pb.set_style(Self::bar_style(color));
            pb.set_message(message);
            pb
        };
        *slot(target) = Some(pb);
    }

    fn on_progress(&self, current: usize, path: &str) {
        if self.quiet {
            return;
        }
        if let Some(pb) = self.active() {
            // Bars advance in on_item_completed; only the spinner counts here.
            if pb.length().is_none() {
                pb.set_position(current as u64);
            }
            pb.set_message(truncate_path(path, 30));
        }
    }

    fn on_item_completed(&self, _bytes: u64) {
        if self.quiet {
            return;
        }
        if let Some(pb) = self.active() {
            pb.inc(1);
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        if let Some(pb) = self.slot_for(phase).and_then(|m| slot(m).take()) {
            pb.finish_with_message(format!("{phase} complete"));
        }
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let name_len = file_name.chars().count();
    if name_len + 4 > max_len {
        let keep = max_len.saturating_sub(3);
        let tail: String = file_name.chars().skip(name_len.saturating_sub(keep)).collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}
