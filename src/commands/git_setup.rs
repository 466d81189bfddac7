//! Git setup command: register clean filters without deploying.
use anyhow::Result;
use std::sync::Arc;

use super::CommandSetup;
use super::render::LogProgress;
use crate::cli::GlobalOpts;
use crate::deploy::CancellationToken;
use crate::logging::{Log, Logger};

/// Register the clean filter of every module and return the exit code.
///
/// # Errors
///
/// Returns an error if settings or the config repository cannot be resolved.
pub fn run(global: &GlobalOpts, log: &Arc<Logger>, cancel: CancellationToken) -> Result<i32> {
    let setup = CommandSetup::init(global, log.as_ref(), cancel)?;
    log.stage("Registering clean filters");
    let progress = LogProgress::new(Arc::clone(log) as Arc<dyn Log>, false);
    Ok(setup
        .orchestrator
        .setup_clean_filters(&setup.repo, &progress))
}
