//! Snapshots command: list pre-deploy snapshots.
use anyhow::Result;

use crate::deploy::{SnapshotInfo, SnapshotProvider};
use crate::logging::Log;

/// List every snapshot, newest first.
///
/// # Errors
///
/// Returns an error if the backup root cannot be read.
pub fn run(provider: &dyn SnapshotProvider, log: &dyn Log) -> Result<i32> {
    log.stage("Snapshots");
    let snapshots = provider.list_snapshots()?;
    if snapshots.is_empty() {
        log.info("no snapshots found");
        return Ok(0);
    }
    for snapshot in &snapshots {
        log.info(&summary_line(snapshot));
        for entry in &snapshot.entries {
            log.debug(&format!(
                "  {} <- {}",
                entry.file_name,
                entry.original_path.display()
            ));
        }
    }
    Ok(0)
}

/// `<id>  <timestamp>  <n> file(s)`.
fn summary_line(snapshot: &SnapshotInfo) -> String {
    format!(
        "{}  {}  {} file(s)",
        snapshot.id,
        snapshot.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        snapshot.entries.len()
    )
}
