//! Subcommand implementations.
//!
//! Every command logs through [`Log`]; deploy and status render the
//! orchestrator's result stream with [`render::LogProgress`].
pub mod completions;
pub mod deploy;
pub mod diff;
pub mod git_setup;
pub mod render;
pub mod restore;
pub mod snapshots;
pub mod status;
pub mod version;

use anyhow::{Context as _, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::GlobalOpts;
use crate::config::Settings;
use crate::config::settings::resolve_config_repo;
use crate::deploy::{CancellationToken, Context, FsSnapshotProvider, Orchestrator};
use crate::logging::Log;
use crate::resources::link::SystemLinkProvider;

/// Shared state produced by the common command setup sequence.
///
/// Encapsulates settings loading, config repo resolution and collaborator
/// wiring so that each command does not have to repeat the boilerplate.
#[derive(Debug)]
pub struct CommandSetup {
    /// Absolute config repository path.
    pub repo: PathBuf,
    /// Orchestrator wired to the system collaborators.
    pub orchestrator: Orchestrator,
}

impl CommandSetup {
    /// Load settings, resolve the config repo and build the system context.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file is invalid or no existing config
    /// repository can be determined.
    pub fn init(global: &GlobalOpts, log: &dyn Log, cancel: CancellationToken) -> Result<Self> {
        log.stage("Resolving configuration");
        let settings = load_settings()?;
        let repo = resolve_config_repo(global.config_path.as_deref(), &settings)?;
        let ctx = Context::system(&repo, &settings, global.machine.as_deref(), cancel);

        log.info(&format!("config repo: {}", repo.display()));
        log.info(&format!(
            "machine: {} ({})",
            ctx.machine_name,
            ctx.platform.os()
        ));
        log.debug(&format!("backup root: {}", settings.backup_root().display()));

        Ok(Self {
            repo,
            orchestrator: Orchestrator::new(ctx),
        })
    }
}

fn load_settings() -> Result<Settings> {
    Settings::load().context("loading settings")
}

/// Snapshot provider rooted at the configured backup directory.
///
/// # Errors
///
/// Returns an error if the settings file is invalid.
pub fn snapshot_provider() -> Result<FsSnapshotProvider> {
    let settings = load_settings()?;
    Ok(FsSnapshotProvider::new(
        settings.backup_root(),
        Arc::new(SystemLinkProvider),
    ))
}
