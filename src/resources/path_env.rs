//! User PATH entry resource.
use anyhow::Result;
use std::sync::Arc;

use super::{Applicable, Resource, ResourceChange, ResourceState};

/// Reads and extends the persistent user PATH.
#[cfg_attr(test, mockall::automock)]
pub trait PathService: Send + Sync + std::fmt::Debug {
    /// Whether `path` is already on the user PATH.
    ///
    /// # Errors
    ///
    /// Returns an error if the PATH cannot be read.
    fn contains(&self, path: &str) -> Result<bool>;

    /// Append `path` to the user PATH.
    ///
    /// # Errors
    ///
    /// Returns an error if the PATH cannot be written.
    fn add(&self, path: &str) -> Result<()>;
}

/// One directory a module wants on PATH.
#[derive(Debug, Clone)]
pub struct PathEntryResource {
    /// Expanded directory.
    pub path: String,
    service: Arc<dyn PathService>,
}

impl PathEntryResource {
    /// Create a new PATH entry resource.
    #[must_use]
    pub fn new(path: String, service: Arc<dyn PathService>) -> Self {
        Self { path, service }
    }
}

impl Applicable for PathEntryResource {
    fn description(&self) -> String {
        format!("PATH += {}", self.path)
    }

    fn apply(&self) -> Result<ResourceChange> {
        if self.service.contains(&self.path)? {
            return Ok(ResourceChange::AlreadyCorrect);
        }
        self.service.add(&self.path)?;
        Ok(ResourceChange::Applied)
    }
}

impl Resource for PathEntryResource {
    fn current_state(&self) -> Result<ResourceState> {
        Ok(if self.service.contains(&self.path)? {
            ResourceState::Correct
        } else {
            ResourceState::Missing
        })
    }
}

/// Whether `list` (a `;` or `:` separated PATH value) contains `path`.
fn path_list_contains(list: &str, path: &str, separator: char, case_insensitive: bool) -> bool {
    let normalize = |p: &str| {
        let p = p.trim().trim_end_matches(['/', '\\']);
        if case_insensitive {
            p.to_lowercase()
        } else {
            p.to_string()
        }
    };
    let wanted = normalize(path);
    list.split(separator)
        .filter(|p| !p.trim().is_empty())
        .any(|p| normalize(p) == wanted)
}

/// User PATH stored in `HKCU\Environment`.
#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsPathService;

#[cfg(windows)]
impl WindowsPathService {
    fn read() -> Result<String> {
        use winreg::RegKey;
        use winreg::enums::HKEY_CURRENT_USER;
        let hkcu = RegKey::predef(HKEY_CURRENT_USER);
        let env = hkcu.open_subkey("Environment")?;
        match env.get_value::<String, _>("Path") {
            Ok(value) => Ok(value),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(windows)]
impl PathService for WindowsPathService {
    fn contains(&self, path: &str) -> Result<bool> {
        Ok(path_list_contains(&Self::read()?, path, ';', true))
    }

    fn add(&self, path: &str) -> Result<()> {
        use anyhow::Context as _;
        use winreg::RegKey;
        use winreg::enums::{HKEY_CURRENT_USER, KEY_READ, KEY_SET_VALUE, RegType};
        use winreg::types::ToRegValue;

        let current = Self::read()?;
        let updated = if current.trim().is_empty() {
            path.to_string()
        } else {
            format!("{};{path}", current.trim_end_matches(';'))
        };
        let hkcu = RegKey::predef(HKEY_CURRENT_USER);
        let env = hkcu
            .open_subkey_with_flags("Environment", KEY_READ | KEY_SET_VALUE)
            .context("open HKCU\\Environment")?;
        let mut raw = updated.to_reg_value();
        raw.vtype = RegType::REG_EXPAND_SZ;
        env.set_raw_value("Path", &raw)
            .context("write HKCU\\Environment\\Path")?;
        Ok(())
    }
}

/// PATH service for platforms where the user PATH lives in shell profiles.
///
/// `contains` consults the process environment; `add` changes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpPathService;

impl PathService for NoOpPathService {
    fn contains(&self, path: &str) -> Result<bool> {
        let list = std::env::var("PATH").unwrap_or_default();
        Ok(path_list_contains(&list, path, ':', false))
    }

    fn add(&self, path: &str) -> Result<()> {
        tracing::debug!("PATH is managed by the shell profile here; not persisting {path}");
        Ok(())
    }
}

/// The PATH service for the running platform.
#[must_use]
pub fn system_service() -> Arc<dyn PathService> {
    #[cfg(windows)]
    {
        Arc::new(WindowsPathService)
    }
    #[cfg(not(windows))]
    {
        Arc::new(NoOpPathService)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn path_list_matching_ignores_trailing_separator_and_case() {
        let list = r"C:\Windows;C:\Tools\bin\;;D:\x";
        assert!(path_list_contains(list, r"c:\tools\bin", ';', true));
        assert!(!path_list_contains(list, r"c:\tools\bin", ';', false));
        assert!(!path_list_contains(list, r"C:\Tools", ';', true));
    }

    #[test]
    fn apply_skips_when_present() {
        let mut service = MockPathService::new();
        service.expect_contains().returning(|_| Ok(true));
        service.expect_add().never();
        let r = PathEntryResource::new("/opt/bin".to_string(), Arc::new(service));
        assert_eq!(r.apply().unwrap(), ResourceChange::AlreadyCorrect);
    }

    #[test]
    fn apply_adds_when_missing() {
        let mut service = MockPathService::new();
        service.expect_contains().returning(|_| Ok(false));
        service.expect_add().times(1).returning(|_| Ok(()));
        let r = PathEntryResource::new("/opt/bin".to_string(), Arc::new(service));
        assert_eq!(r.current_state().unwrap(), ResourceState::Missing);
        assert_eq!(r.apply().unwrap(), ResourceChange::Applied);
    }
}
