//! System package declarations: `install.toml` and the flat `packages.toml`.
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use super::toml_loader;
use crate::error::ConfigError;
use crate::platform::Os;

/// Package managers a package can be declared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageManager {
    /// Windows Package Manager.
    Winget,
    /// Chocolatey.
    Choco,
    /// Debian/Ubuntu apt.
    Apt,
    /// Homebrew.
    Brew,
    /// npm global packages.
    Npm,
    /// bun global packages.
    Bun,
    /// `dotnet tool install -g`.
    DotnetTool,
    /// VS Code extensions.
    Vscode,
    /// `PowerShell` modules.
    PsModule,
}

impl PackageManager {
    /// Whether this manager installs system packages on `os`.
    ///
    /// Language and editor managers are never a platform match; their
    /// packages are deployed through modules instead.
    #[must_use]
    pub const fn is_platform_match(self, os: Os) -> bool {
        matches!(
            (self, os),
            (Self::Winget | Self::Choco, Os::Windows)
                | (Self::Apt, Os::Linux)
                | (Self::Brew, Os::MacOs)
        )
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Winget => "winget",
            Self::Choco => "choco",
            Self::Apt => "apt",
            Self::Brew => "brew",
            Self::Npm => "npm",
            Self::Bun => "bun",
            Self::DotnetTool => "dotnet-tool",
            Self::Vscode => "vscode",
            Self::PsModule => "ps-module",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for PackageManager {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "winget" => Ok(Self::Winget),
            "choco" | "chocolatey" => Ok(Self::Choco),
            "apt" => Ok(Self::Apt),
            "brew" | "homebrew" => Ok(Self::Brew),
            "npm" => Ok(Self::Npm),
            "bun" => Ok(Self::Bun),
            "dotnet-tool" => Ok(Self::DotnetTool),
            "vscode" => Ok(Self::Vscode),
            "ps-module" => Ok(Self::PsModule),
            other => Err(format!("unknown package manager '{other}'")),
        }
    }
}

/// A package to install with a specific manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDefinition {
    /// Package identifier for `manager`.
    pub name: String,
    /// Manager that installs it.
    pub manager: PackageManager,
    /// Other identifiers the same package may already be installed under.
    pub alternative_ids: Vec<String>,
}

impl PackageDefinition {
    /// A package with no alternative ids.
    #[must_use]
    pub fn new(name: impl Into<String>, manager: PackageManager) -> Self {
        Self {
            name: name.into(),
            manager,
            alternative_ids: Vec::new(),
        }
    }
}

/// Per-machine adjustments to the app list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MachineOverrides {
    /// Extra catalog ids for this machine.
    #[serde(default)]
    pub add: Vec<String>,
    /// Catalog ids removed for this machine.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Structured install manifest (`install.toml`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InstallManifest {
    /// Catalog ids installed everywhere.
    #[serde(default)]
    pub apps: Vec<String>,
    /// Catalog ids of fonts.
    #[serde(default)]
    pub fonts: Vec<String>,
    /// Per-machine overrides keyed by machine name.
    #[serde(default)]
    pub machines: HashMap<String, MachineOverrides>,
}

/// Load `install.toml` if present.
///
/// # Errors
///
/// Returns an error if the file exists but is not a valid manifest.
pub fn load_install_manifest(repo: &Path) -> Result<Option<InstallManifest>, ConfigError> {
    toml_loader::load_optional(&repo.join("install.toml"))
}

/// Parsed flat package list with per-entry errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageList {
    /// Valid entries in declaration order.
    pub packages: Vec<PackageDefinition>,
    /// One message per invalid entry.
    pub errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawPackageList {
    #[serde(default)]
    packages: Vec<RawPackage>,
}

#[derive(Debug, Deserialize)]
struct RawPackage {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    manager: Option<String>,
}

/// Parse the flat `packages.toml` list.
///
/// Invalid entries are reported in [`PackageList::errors`] and skipped; the
/// remaining entries are still returned.
///
/// # Errors
///
/// Returns an error only when the document itself is not valid TOML.
pub fn parse_package_list(content: &str) -> Result<PackageList, ConfigError> {
    let raw: RawPackageList = toml_loader::parse_str(content, "packages.toml")?;
    let mut list = PackageList::default();
    for (i, entry) in raw.packages.into_iter().enumerate() {
        let Some(name) = entry.name.filter(|n| !n.trim().is_empty()) else {
            list.errors.push(format!("Package [{i}] is missing 'name'."));
            continue;
        };
        let manager_text = entry.manager.unwrap_or_default();
        match manager_text.parse::<PackageManager>() {
            Ok(manager) => list.packages.push(PackageDefinition::new(name, manager)),
            Err(_) => list.errors.push(format!(
                "Package [{i}] '{name}' has unknown or missing 'manager': '{manager_text}'."
            )),
        }
    }
    Ok(list)
}

/// Load `packages.toml` if present.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or is not TOML.
pub fn load_package_list(repo: &Path) -> Result<Option<PackageList>, ConfigError> {
    let path = repo.join("packages.toml");
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_package_list(&content).map(Some)
}
