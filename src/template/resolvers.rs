//! Reference and variable resolvers used when rendering templates.
use anyhow::{Result, bail};
use std::collections::HashMap;
use std::sync::Arc;

use crate::exec::Executor;
use crate::platform::Os;

/// Resolves secret references such as `op://vault/item/field`.
#[cfg_attr(test, mockall::automock)]
pub trait ReferenceResolver: Send + Sync + std::fmt::Debug {
    /// Resolve `reference` to its secret value.
    ///
    /// # Errors
    ///
    /// Returns an error carrying the resolver's diagnostic when the
    /// reference cannot be read.
    fn resolve(&self, reference: &str) -> Result<String>;
}

/// Resolves named template variables.
#[cfg_attr(test, mockall::automock)]
pub trait VariableResolver: Send + Sync + std::fmt::Debug {
    /// Value of `name`, `None` when unknown.
    fn resolve(&self, name: &str, variables: &HashMap<String, String>) -> Option<String>;
}

/// Reads references through the 1Password CLI (`op read <ref>`).
#[derive(Debug, Clone)]
pub struct OnePasswordResolver {
    executor: Arc<dyn Executor>,
}

impl OnePasswordResolver {
    /// Create a resolver that spawns `op` through `executor`.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }
}

impl ReferenceResolver for OnePasswordResolver {
    fn resolve(&self, reference: &str) -> Result<String> {
        let result = self.executor.run_unchecked("op", &["read", reference])?;
        if !result.success {
            bail!(
                "op read failed (exit {}): {}",
                result.exit_code(),
                result.detail()
            );
        }
        Ok(result.stdout.trim().to_string())
    }
}

/// Machine profile variables first, then the built-ins `machine.name`,
/// `platform` and `date`.
#[derive(Debug, Clone)]
pub struct MachineVariableResolver {
    machine_name: String,
    os: Os,
}

impl MachineVariableResolver {
    /// Create a resolver for `machine_name` on `os`.
    #[must_use]
    pub fn new(machine_name: impl Into<String>, os: Os) -> Self {
        Self {
            machine_name: machine_name.into(),
            os,
        }
    }
}

impl VariableResolver for MachineVariableResolver {
    fn resolve(&self, name: &str, variables: &HashMap<String, String>) -> Option<String> {
        if let Some(value) = variables.get(name) {
            return Some(value.clone());
        }
        match name {
            "machine.name" => Some(self.machine_name.clone()),
            "platform" => Some(self.os.to_string()),
            "date" => Some(chrono::Local::now().format("%Y-%m-%d").to_string()),
            _ => None,
        }
    }
}
