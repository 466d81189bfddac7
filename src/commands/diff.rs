//! Diff commands: record a directory, then list what changed in it.
use anyhow::Result;
use std::path::Path;

use crate::deploy::CancellationToken;
use crate::diff::DiffTracker;
use crate::logging::Log;

/// Record every file below `path`.
///
/// # Errors
///
/// Returns an error if `path` is not a directory or the state cannot be
/// written.
pub fn start(
    tracker: &DiffTracker,
    path: &Path,
    log: &dyn Log,
    cancel: &CancellationToken,
) -> Result<i32> {
    log.stage(&format!("Recording {}", path.display()));
    if tracker.is_active() {
        log.debug("replacing the previous recording");
    }
    let state = tracker.start(path, cancel)?;
    log.info(&format!(
        "recorded {} file(s) under {}",
        state.files.len(),
        state.root.display()
    ));
    log.info("make your changes, then run 'perch diff stop'");
    Ok(0)
}

/// List the changes since [`start`] and forget the recording.
///
/// Returns `1` when nothing was recorded.
///
/// # Errors
///
/// Returns an error if the recorded state cannot be read or the directory
/// cannot be rescanned.
pub fn stop(tracker: &DiffTracker, log: &dyn Log, cancel: &CancellationToken) -> Result<i32> {
    let Some(report) = tracker.stop(cancel)? else {
        log.error("No active diff. Run 'perch diff start <path>' first.");
        return Ok(1);
    };
    log.stage(&format!("Changes in {}", report.root.display()));
    if report.changes.is_empty() {
        log.info("no changes detected");
    }
    for change in &report.changes {
        log.info(&format!("{:<8} {}", change.kind, change.path));
    }
    Ok(0)
}
