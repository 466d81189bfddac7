//! Machine profiles (`<repo>/machines/base.toml` + `<repo>/machines/<name>.toml`).
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use super::toml_loader;
use crate::error::ConfigError;

/// Per-machine module selection and template variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MachineProfile {
    /// When non-empty, only these modules are deployed.
    #[serde(default)]
    pub include_modules: Vec<String>,
    /// Modules never deployed on this machine.
    #[serde(default)]
    pub exclude_modules: Vec<String>,
    /// Variables available to templates and target expansion.
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

impl MachineProfile {
    /// Overlay `other` on top of `self`: lists are concatenated and variables
    /// are overridden key by key.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.include_modules.extend(other.include_modules);
        self.exclude_modules.extend(other.exclude_modules);
        self.variables.extend(other.variables);
        self
    }

    /// Case-insensitive membership test against `include_modules`.
    #[must_use]
    pub fn includes(&self, module: &str) -> bool {
        contains_ignore_case(&self.include_modules, module)
    }

    /// Case-insensitive membership test against `exclude_modules`.
    #[must_use]
    pub fn excludes(&self, module: &str) -> bool {
        contains_ignore_case(&self.exclude_modules, module)
    }
}

fn contains_ignore_case(list: &[String], value: &str) -> bool {
    list.iter().any(|item| item.eq_ignore_ascii_case(value))
}

/// Loads the machine profile for a run.
pub trait MachineProfileSource: Send + Sync + std::fmt::Debug {
    /// Load the profile for the current machine from `repo`.
    ///
    /// Returns `Ok(None)` when neither the base nor the machine file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a profile file exists but cannot be parsed.
    fn load(&self, repo: &Path) -> Result<Option<MachineProfile>, ConfigError>;
}

/// Reads `machines/base.toml` and `machines/<machine_name>.toml`.
#[derive(Debug, Clone)]
pub struct TomlMachineProfileSource {
    machine_name: String,
}

impl TomlMachineProfileSource {
    /// Create a source for `machine_name`.
    #[must_use]
    pub fn new(machine_name: impl Into<String>) -> Self {
        Self {
            machine_name: machine_name.into(),
        }
    }

    /// The machine this source loads profiles for.
    #[must_use]
    pub fn machine_name(&self) -> &str {
        &self.machine_name
    }
}

impl MachineProfileSource for TomlMachineProfileSource {
    fn load(&self, repo: &Path) -> Result<Option<MachineProfile>, ConfigError> {
        let dir = repo.join("machines");
        let base: Option<MachineProfile> = toml_loader::load_optional(&dir.join("base.toml"))?;
        let machine: Option<MachineProfile> =
            toml_loader::load_optional(&dir.join(format!("{}.toml", self.machine_name)))?;

        Ok(match (base, machine) {
            (Some(base), Some(machine)) => Some(base.merge(machine)),
            (base, machine) => base.or(machine),
        })
    }
}

/// Best-effort host name used as the default machine name.
#[must_use]
pub fn host_name() -> String {
    ["COMPUTERNAME", "HOSTNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_string())
}
