//! Global npm/bun package resource.
use anyhow::Result;
use std::sync::Arc;

use super::helpers::cmd::{failure_message, run_cli};
use super::{Applicable, Resource, ResourceChange, ResourceState};
use crate::config::module::GlobalPackageManager;
use crate::exec::{Executor, display_command};

/// One package installed globally through npm or bun.
#[derive(Debug, Clone)]
pub struct GlobalPackageResource {
    /// Package name, optionally scoped (`@scope/name`).
    pub package: String,
    /// Manager that installs it.
    pub manager: GlobalPackageManager,
    executor: Arc<dyn Executor>,
}

impl GlobalPackageResource {
    /// Create a new global package resource.
    #[must_use]
    pub fn new(
        package: String,
        manager: GlobalPackageManager,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            package,
            manager,
            executor,
        }
    }

    /// Program and arguments that install the package.
    #[must_use]
    pub fn install_args(&self) -> (&'static str, Vec<&str>) {
        match self.manager {
            GlobalPackageManager::Npm => ("npm", vec!["install", "-g", &self.package]),
            GlobalPackageManager::Bun => ("bun", vec!["add", "-g", &self.package]),
        }
    }

    /// Rendered install command, e.g. `npm install -g typescript`.
    #[must_use]
    pub fn command_line(&self) -> String {
        let (program, args) = self.install_args();
        display_command(program, &args)
    }

    fn is_installed(&self) -> Result<bool> {
        match self.manager {
            GlobalPackageManager::Npm => {
                let result = run_cli(
                    &*self.executor,
                    "npm",
                    &["list", "-g", &self.package, "--depth=0"],
                )?;
                Ok(result.success)
            }
            GlobalPackageManager::Bun => {
                let result = run_cli(&*self.executor, "bun", &["pm", "ls", "-g"])?;
                Ok(result.success && bun_lists(&result.stdout, &self.package))
            }
        }
    }
}

/// Whether `bun pm ls -g` output lists `package`.
///
/// Lines look like `├── typescript@5.4.5`; the tree glyphs are stripped.
fn bun_lists(stdout: &str, package: &str) -> bool {
    let versioned = format!("{package}@");
    stdout.lines().any(|line| {
        let entry = line
            .trim()
            .trim_start_matches(|c: char| !c.is_alphanumeric() && c != '@');
        entry == package || entry.starts_with(&versioned)
    })
}

impl Applicable for GlobalPackageResource {
    fn description(&self) -> String {
        format!("{} ({})", self.package, self.manager)
    }

    fn apply(&self) -> Result<ResourceChange> {
        if self.is_installed()? {
            return Ok(ResourceChange::AlreadyCorrect);
        }
        let (program, args) = self.install_args();
        let result = run_cli(&*self.executor, program, &args)?;
        if result.success {
            Ok(ResourceChange::Applied)
        } else {
            Ok(ResourceChange::Failed {
                message: failure_message(program, &args, &result),
            })
        }
    }
}

impl Resource for GlobalPackageResource {
    fn current_state(&self) -> Result<ResourceState> {
        Ok(if self.is_installed()? {
            ResourceState::Correct
        } else {
            ResourceState::Missing
        })
    }
}
