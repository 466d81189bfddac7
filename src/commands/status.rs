//! Status command implementation.
use anyhow::{Context as _, Result};
use std::sync::Arc;

use super::CommandSetup;
use super::render::LogProgress;
use crate::cli::{GlobalOpts, OutputFormat, StatusOpts};
use crate::deploy::{CancellationToken, CollectingProgress, DeployResult};
use crate::logging::{Log, Logger};

/// Run the status command and return the process exit code.
///
/// # Errors
///
/// Returns an error if the config repository cannot be resolved or the JSON
/// report cannot be written.
pub fn run(
    global: &GlobalOpts,
    opts: &StatusOpts,
    log: &Arc<Logger>,
    cancel: CancellationToken,
) -> Result<i32> {
    let setup = CommandSetup::init(global, log.as_ref(), cancel)?;
    match opts.output {
        OutputFormat::Pretty => {
            let progress = LogProgress::new(Arc::clone(log) as Arc<dyn Log>, false);
            let code = setup.orchestrator.check_status(&setup.repo, &progress);
            if code == 0 {
                log.info("everything is in place");
            }
            Ok(code)
        }
        OutputFormat::Json => {
            let progress = CollectingProgress::new();
            let code = setup.orchestrator.check_status(&setup.repo, &progress);
            write_json(&mut std::io::stdout().lock(), &progress.results())?;
            Ok(code)
        }
    }
}

/// Write `results` as a pretty-printed JSON array followed by a newline.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_json(out: &mut impl std::io::Write, results: &[DeployResult]) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, results).context("serializing status")?;
    writeln!(out).context("writing status")?;
    Ok(())
}
