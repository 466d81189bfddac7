//! Restore command: put snapshot entries back in place.
use anyhow::Result;

use crate::cli::RestoreOpts;
use crate::deploy::{CancellationToken, RestoreOutcome, SnapshotProvider};
use crate::logging::Log;

/// Restore snapshot `opts.id` and return the process exit code.
///
/// Returns `1` when any entry failed or nothing matched `--file`.
///
/// # Errors
///
/// Never fails; restore problems are reported per entry.
pub fn run(
    provider: &dyn SnapshotProvider,
    opts: &RestoreOpts,
    log: &dyn Log,
    cancel: &CancellationToken,
) -> Result<i32> {
    log.stage(&format!("Restoring snapshot {}", opts.id));
    let results = provider.restore_snapshot(&opts.id, opts.file.as_deref(), cancel);

    if results.is_empty() {
        match &opts.file {
            Some(file) => log.error(&format!("no entry named '{file}' in snapshot {}", opts.id)),
            None => log.info("snapshot is empty"),
        }
        return Ok(i32::from(opts.file.is_some()));
    }

    let mut failed = false;
    for result in &results {
        let path = result.original_path.display();
        let detail = result
            .message
            .as_deref()
            .map_or_else(String::new, |m| format!(" ({m})"));
        match result.outcome {
            RestoreOutcome::Restored => log.info(&format!("restored {path}")),
            RestoreOutcome::Skipped => log.debug(&format!("skipped {path}{detail}")),
            RestoreOutcome::Error => {
                failed = true;
                log.error(&format!("{}: {}", result.file_name, detail.trim()));
            }
        }
    }
    Ok(i32::from(failed))
}
