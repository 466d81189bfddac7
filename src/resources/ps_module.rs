//! `PowerShell` module resource.
use anyhow::Result;
use std::sync::Arc;

use super::helpers::cmd::failure_message;
use super::{Applicable, Resource, ResourceChange, ResourceState};
use crate::exec::Executor;

/// A `PowerShell` module installed for the current user from the gallery.
#[derive(Debug, Clone)]
pub struct PsModuleResource {
    /// Module name.
    pub name: String,
    executor: Arc<dyn Executor>,
}

impl PsModuleResource {
    /// Create a new `PowerShell` module resource.
    #[must_use]
    pub fn new(name: String, executor: Arc<dyn Executor>) -> Self {
        Self { name, executor }
    }

    /// The `PowerShell` statement that installs the module.
    #[must_use]
    pub fn command_line(&self) -> String {
        format!(
            "Install-Module -Name {} -Scope CurrentUser -Force",
            quote(&self.name)
        )
    }

    fn is_installed(&self) -> Result<bool> {
        let script = format!(
            "Get-Module -ListAvailable -Name {} | Select-Object -First 1 -ExpandProperty Name",
            quote(&self.name)
        );
        let result = self
            .executor
            .run_unchecked("pwsh", &["-NoProfile", "-Command", &script])?;
        Ok(result.success && !result.stdout.trim().is_empty())
    }
}

/// Single-quote a `PowerShell` argument when it is not a plain word.
fn quote(name: &str) -> String {
    if name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

impl Applicable for PsModuleResource {
    fn description(&self) -> String {
        self.name.clone()
    }

    fn apply(&self) -> Result<ResourceChange> {
        if self.is_installed()? {
            return Ok(ResourceChange::AlreadyCorrect);
        }
        let script = self.command_line();
        let args = ["-NoProfile", "-Command", script.as_str()];
        let result = self.executor.run_unchecked("pwsh", &args)?;
        if result.success {
            Ok(ResourceChange::Applied)
        } else {
            Ok(ResourceChange::Failed {
                message: failure_message("pwsh", &args, &result),
            })
        }
    }
}

impl Resource for PsModuleResource {
    fn current_state(&self) -> Result<ResourceState> {
        Ok(if self.is_installed()? {
            ResourceState::Correct
        } else {
            ResourceState::Missing
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::resources::test_helpers::MockExecutor;

    #[test]
    fn quote_only_when_needed() {
        assert_eq!(quote("PSReadLine"), "PSReadLine");
        assert_eq!(quote("posh git"), "'posh git'");
        assert_eq!(quote("it's"), "'it''s'");
    }

    #[test]
    fn command_line_shape() {
        let r = PsModuleResource::new(
            "Terminal-Icons".to_string(),
            Arc::new(MockExecutor::empty()),
        );
        assert_eq!(
            r.command_line(),
            "Install-Module -Name Terminal-Icons -Scope CurrentUser -Force"
        );
    }

    #[test]
    fn installed_module_is_left_alone() {
        let exec = Arc::new(MockExecutor::ok("PSReadLine\n"));
        let r = PsModuleResource::new("PSReadLine".to_string(), exec.clone());
        assert_eq!(r.apply().unwrap(), ResourceChange::AlreadyCorrect);
        assert_eq!(exec.call_count(), 1);
    }

    #[test]
    fn missing_module_is_installed() {
        let exec = Arc::new(MockExecutor::with_responses(vec![
            (true, String::new()),
            (true, String::new()),
            (true, "installed".to_string()),
        ]));
        let r = PsModuleResource::new("PSReadLine".to_string(), exec.clone());
        assert_eq!(r.current_state().unwrap(), ResourceState::Missing);
        assert_eq!(r.apply().unwrap(), ResourceChange::Applied);
    }
}
