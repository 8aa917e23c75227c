//! Progress UI (spinner) for sync runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use library_mirror::SyncStats;

/// Creates the spinner bar, hidden when `enabled` is false.
///
/// The bar is created before the run so prompts can suspend it.
pub(crate) fn new_spinner(enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner
}

/// Spawns the progress UI on `spinner` when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_spinner` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    spinner: ProgressBar,
    stats: Arc<SyncStats>,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_spinner {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_spinner_inner(spinner, stats, Arc::clone(&stop));
    (Some(handle), stop)
}

// Runs on the blocking pool: a prompt holds the bar's lock while the
// operator types, and message updates wait for it.
fn spawn_spinner_inner(
    spinner: ProgressBar,
    stats: Arc<SyncStats>,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        spinner.enable_steady_tick(Duration::from_millis(100));

        while !stop.load(Ordering::SeqCst) {
            spinner.set_message(progress_message(&stats));
            std::thread::sleep(Duration::from_millis(120));
        }

        spinner.finish_and_clear();
    })
}

fn progress_message(stats: &SyncStats) -> String {
    let total = stats.planned();
    let mut message = format!(
        "[{}/{}] fetched {}",
        stats.completed().min(total),
        total,
        stats.fetched()
    );
    let skipped = stats.unavailable() + stats.malformed() + stats.auth_invalid();
    if skipped > 0 {
        message.push_str(&format!(", skipped {skipped}"));
    }
    if stats.auth_retries() > 0 {
        message.push_str(&format!(", re-authenticated {}", stats.auth_retries()));
    }
    message
}
