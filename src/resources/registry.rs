//! Registry value resource.
use anyhow::{Context as _, Result};
use std::sync::Arc;

use super::{Applicable, Resource, ResourceChange, ResourceState};
use crate::config::module::{RegistryEntry, RegistryKind, RegistryValue, parse_hex};

/// Native registry access.
#[cfg_attr(test, mockall::automock)]
pub trait RegistryProvider: Send + Sync + std::fmt::Debug {
    /// Current data of `key\name` rendered as a string, `None` when the key
    /// or value does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the value exists but cannot be read.
    fn get_value(&self, key: &str, name: &str) -> Result<Option<String>>;

    /// Write `key\name`, creating the key if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be created or the value written.
    fn set_value(
        &self,
        key: &str,
        name: &str,
        value: &RegistryValue,
        kind: RegistryKind,
    ) -> Result<()>;

    /// Delete `key\name`. Deleting an absent value succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the value exists but cannot be deleted.
    fn delete_value(&self, key: &str, name: &str) -> Result<()>;
}

/// A registry value a module manages.
#[derive(Debug, Clone)]
pub struct RegistryResource {
    /// Declared entry.
    pub entry: RegistryEntry,
    provider: Arc<dyn RegistryProvider>,
}

impl RegistryResource {
    /// Create a new registry resource.
    #[must_use]
    pub fn new(entry: RegistryEntry, provider: Arc<dyn RegistryProvider>) -> Self {
        Self { entry, provider }
    }

    /// Determine the state from an already read current value.
    #[must_use]
    pub fn state_from_current(&self, current: Option<&str>) -> ResourceState {
        match (&self.entry.value, current) {
            (None, None) => ResourceState::Correct,
            (Some(_), None) => ResourceState::Missing,
            (Some(desired), Some(current)) if value_matches(current, desired) => {
                ResourceState::Correct
            }
            (_, Some(current)) => ResourceState::Incorrect {
                current: current.to_string(),
            },
        }
    }
}

impl Applicable for RegistryResource {
    fn description(&self) -> String {
        match &self.entry.value {
            Some(value) => format!("{} = {value}", self.entry.display_path()),
            None => format!("{} (delete)", self.entry.display_path()),
        }
    }

    fn apply(&self) -> Result<ResourceChange> {
        if !self.needs_change()? {
            return Ok(ResourceChange::AlreadyCorrect);
        }
        match &self.entry.value {
            Some(value) => self
                .provider
                .set_value(
                    &self.entry.key,
                    &self.entry.name,
                    value,
                    self.entry.effective_kind(),
                )
                .with_context(|| format!("set registry: {}", self.entry.display_path()))?,
            None => self
                .provider
                .delete_value(&self.entry.key, &self.entry.name)
                .with_context(|| format!("delete registry: {}", self.entry.display_path()))?,
        }
        Ok(ResourceChange::Applied)
    }
}

impl Resource for RegistryResource {
    fn current_state(&self) -> Result<ResourceState> {
        let current = self.provider.get_value(&self.entry.key, &self.entry.name)?;
        Ok(self.state_from_current(current.as_deref()))
    }
}

/// Compare registry data, treating integers (decimal or `0x` hex) numerically.
fn value_matches(current: &str, desired: &RegistryValue) -> bool {
    let current = current.trim();
    match desired {
        RegistryValue::Number(n) => current.parse::<u64>().ok() == Some(*n),
        RegistryValue::Text(s) => parse_hex(s).map_or_else(
            || current == s,
            |n| current.parse::<u64>().ok() == Some(n),
        ),
    }
}

/// Split `HKCU\Software\...` (or `HKCU:\Software\...`) into hive and subkey.
fn split_hive(key: &str) -> (&str, &str) {
    let (hive, subkey) = key.split_once('\\').unwrap_or((key, ""));
    (hive.trim_end_matches(':'), subkey)
}

#[cfg(windows)]
fn registry_error(key: &str, name: &str, e: &std::io::Error) -> anyhow::Error {
    crate::error::ResourceError::Registry {
        key: key.to_string(),
        name: name.to_string(),
        message: e.to_string(),
    }
    .into()
}

/// [`RegistryProvider`] backed by the `winreg` crate.
#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsRegistryProvider;

#[cfg(windows)]
impl WindowsRegistryProvider {
    fn hive(key: &str) -> Result<(winreg::RegKey, &str)> {
        use winreg::RegKey;
        use winreg::enums::{HKEY_CLASSES_ROOT, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, HKEY_USERS};
        let (hive, subkey) = split_hive(key);
        let predef = match hive.to_ascii_uppercase().as_str() {
            "HKCU" | "HKEY_CURRENT_USER" => HKEY_CURRENT_USER,
            "HKLM" | "HKEY_LOCAL_MACHINE" => HKEY_LOCAL_MACHINE,
            "HKCR" | "HKEY_CLASSES_ROOT" => HKEY_CLASSES_ROOT,
            "HKU" | "HKEY_USERS" => HKEY_USERS,
            other => anyhow::bail!("unknown registry hive: {other}"),
        };
        Ok((RegKey::predef(predef), subkey))
    }
}

#[cfg(windows)]
impl RegistryProvider for WindowsRegistryProvider {
    fn get_value(&self, key: &str, name: &str) -> Result<Option<String>> {
        use winreg::enums::RegType;
        let (root, subkey) = Self::hive(key)?;
        let reg = match root.open_subkey(subkey) {
            Ok(reg) => reg,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("open registry key: {key}")),
        };
        let raw = match reg.get_raw_value(name) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("read registry: {key}\\{name}")),
        };
        let value = match raw.vtype {
            RegType::REG_DWORD => reg.get_value::<u32, _>(name)?.to_string(),
            RegType::REG_QWORD => reg.get_value::<u64, _>(name)?.to_string(),
            _ => reg.get_value::<String, _>(name)?,
        };
        Ok(Some(value))
    }

    fn set_value(
        &self,
        key: &str,
        name: &str,
        value: &RegistryValue,
        kind: RegistryKind,
    ) -> Result<()> {
        use winreg::enums::RegType;
        use winreg::types::ToRegValue;
        let (root, subkey) = Self::hive(key)?;
        let (reg, _) = root
            .create_subkey(subkey)
            .with_context(|| format!("create registry key: {key}"))?;
        let number = match value {
            RegistryValue::Number(n) => Some(*n),
            RegistryValue::Text(s) => parse_hex(s),
        };
        let result = match (kind, number) {
            (RegistryKind::Dword, Some(n)) => {
                let n = u32::try_from(n).with_context(|| format!("{n} does not fit a DWORD"))?;
                reg.set_value(name, &n)
            }
            (RegistryKind::Qword, Some(n)) => reg.set_value(name, &n),
            (RegistryKind::ExpandString, _) => {
                let mut raw = value.to_string().to_reg_value();
                raw.vtype = RegType::REG_EXPAND_SZ;
                reg.set_raw_value(name, &raw)
            }
            _ => reg.set_value(name, &value.to_string()),
        };
        result.map_err(|e| registry_error(key, name, &e))
    }

    fn delete_value(&self, key: &str, name: &str) -> Result<()> {
        use winreg::enums::KEY_SET_VALUE;
        let (root, subkey) = Self::hive(key)?;
        let reg = match root.open_subkey_with_flags(subkey, KEY_SET_VALUE) {
            Ok(reg) => reg,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e).with_context(|| format!("open registry key: {key}")),
        };
        match reg.delete_value(name) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(registry_error(key, name, &e)),
        }
    }
}

/// [`RegistryProvider`] for platforms without a registry. Every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedRegistryProvider;

impl UnsupportedRegistryProvider {
    fn unsupported() -> anyhow::Error {
        crate::error::PlatformError::Unsupported {
            platform: std::env::consts::OS.to_string(),
        }
        .into()
    }
}

impl RegistryProvider for UnsupportedRegistryProvider {
    fn get_value(&self, _: &str, _: &str) -> Result<Option<String>> {
        Err(Self::unsupported())
    }

    fn set_value(&self, _: &str, _: &str, _: &RegistryValue, _: RegistryKind) -> Result<()> {
        Err(Self::unsupported())
    }

    fn delete_value(&self, _: &str, _: &str) -> Result<()> {
        Err(Self::unsupported())
    }
}

/// The registry provider for the running platform.
#[must_use]
pub fn system_provider() -> Arc<dyn RegistryProvider> {
    #[cfg(windows)]
    {
        Arc::new(WindowsRegistryProvider)
    }
    #[cfg(not(windows))]
    {
        Arc::new(UnsupportedRegistryProvider)
    }
}
