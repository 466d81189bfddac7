//! VS Code extension resource.
use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;

use super::helpers::cmd::{failure_message, run_cli};
use super::{Applicable, Resource, ResourceChange, ResourceState};
use crate::exec::{Executor, display_command};

/// A VS Code extension checked against a pre-fetched installed list.
#[derive(Debug, Clone)]
pub struct VsCodeExtensionResource {
    /// Extension identifier (e.g. "rust-lang.rust-analyzer").
    pub id: String,
    /// VS Code CLI command (`code` or `code-insiders`).
    pub code_cmd: String,
    installed: Arc<HashSet<String>>,
    executor: Arc<dyn Executor>,
}

impl VsCodeExtensionResource {
    /// Create a new VS Code extension resource.
    #[must_use]
    pub fn new(
        id: String,
        code_cmd: String,
        installed: Arc<HashSet<String>>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            id,
            code_cmd,
            installed,
            executor,
        }
    }

    fn install_args(&self) -> Vec<&str> {
        vec!["--install-extension", &self.id]
    }

    /// Rendered install command.
    #[must_use]
    pub fn command_line(&self) -> String {
        display_command(&self.code_cmd, &self.install_args())
    }
}

/// Query the installed extension ids (lower-cased) in a single command.
///
/// # Errors
///
/// Returns an error if the VS Code CLI cannot be spawned.
pub fn get_installed_extensions(
    code_cmd: &str,
    executor: &dyn Executor,
) -> Result<HashSet<String>> {
    let result = run_cli(executor, code_cmd, &["--list-extensions"])?;
    let mut set = HashSet::new();
    if result.success {
        for line in result.stdout.lines() {
            let id = line.trim().to_lowercase();
            if !id.is_empty() {
                set.insert(id);
            }
        }
    }
    Ok(set)
}

/// Find the VS Code CLI, preferring the stable channel.
#[must_use]
pub fn find_code_command(executor: &dyn Executor) -> Option<String> {
    ["code", "code-insiders"]
        .into_iter()
        .find(|cmd| executor.which(cmd))
        .map(str::to_string)
}

impl Applicable for VsCodeExtensionResource {
    fn description(&self) -> String {
        self.id.clone()
    }

    fn apply(&self) -> Result<ResourceChange> {
        if self.installed.contains(&self.id.to_lowercase()) {
            return Ok(ResourceChange::AlreadyCorrect);
        }
        let args = self.install_args();
        let result = run_cli(&*self.executor, &self.code_cmd, &args)?;
        if result.success {
            Ok(ResourceChange::Applied)
        } else {
            Ok(ResourceChange::Failed {
                message: failure_message(&self.code_cmd, &args, &result),
            })
        }
    }
}

impl Resource for VsCodeExtensionResource {
    fn current_state(&self) -> Result<ResourceState> {
        Ok(if self.installed.contains(&self.id.to_lowercase()) {
            ResourceState::Correct
        } else {
            ResourceState::Missing
        })
    }
}
