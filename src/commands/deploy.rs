//! Deploy command implementation.
use anyhow::Result;
use std::sync::Arc;

use super::CommandSetup;
use super::render::LogProgress;
use crate::cli::{DeployOpts, GlobalOpts};
use crate::deploy::{AlwaysProceed, CancellationToken, Confirmer, DeployOptions, PromptConfirmer};
use crate::logging::{Log, Logger};

/// Run the deploy command and return the process exit code.
///
/// # Errors
///
/// Returns an error if settings or the config repository cannot be resolved.
/// Failures during the run itself are reported and folded into the exit code.
pub fn run(
    global: &GlobalOpts,
    opts: &DeployOpts,
    log: &Arc<Logger>,
    cancel: CancellationToken,
) -> Result<i32> {
    let version = super::version::version();
    log.info(&format!("perch {version}"));

    let setup = CommandSetup::init(global, log.as_ref(), cancel)?;
    let shared: Arc<dyn Log> = Arc::<Logger>::clone(log);
    let progress = LogProgress::new(Arc::clone(&shared), global.dry_run);
    let options = DeployOptions {
        dry_run: global.dry_run,
    };

    let confirmer: Box<dyn Confirmer> = if opts.interactive {
        Box::new(PromptConfirmer::new(shared))
    } else {
        Box::new(AlwaysProceed)
    };

    let code = setup
        .orchestrator
        .deploy(&setup.repo, &options, &progress, confirmer.as_ref());

    log.print_summary();
    let failed = log.failure_count();
    if failed > 0 {
        log.warn(&format!("{failed} module(s) failed"));
    }
    if setup.orchestrator.context().cancel.is_cancelled() {
        log.warn("deploy cancelled");
    }
    Ok(code)
}
