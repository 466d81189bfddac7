//! Module manifest model (`<repo>/<module>/module.toml`).
//!
//! A module is the unit of deployment: a directory holding config files plus
//! a manifest that declares links, registry values, PATH entries, packages and
//! hooks. Manifests are parsed into the raw serde shapes below and then
//! validated into [`Module`].
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use super::toml_loader;
use crate::platform::Os;

/// How a link is materialised on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// A symbolic link (file or directory).
    #[default]
    Symlink,
    /// An NTFS junction. Falls back to a directory symlink elsewhere.
    Junction,
}

/// Where a link should be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// The same target expression on every platform.
    All(String),
    /// One target expression per platform.
    PerPlatform(HashMap<Os, String>),
}

/// One declared link inside a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    /// Source path relative to the module directory.
    pub source: String,
    /// Target expression(s) before environment expansion.
    pub target: LinkTarget,
    /// Link flavour.
    pub kind: LinkKind,
    /// Whether the source is a template that must be rendered first.
    pub template: bool,
    /// Platforms this link applies to (empty = all).
    pub platforms: Vec<Os>,
}

impl LinkEntry {
    /// Target expression for `os`, or `None` when the link has no target there.
    #[must_use]
    pub fn target_for(&self, os: Os) -> Option<&str> {
        match &self.target {
            LinkTarget::All(target) => Some(target),
            LinkTarget::PerPlatform(targets) => targets.get(&os).map(String::as_str),
        }
    }

    /// Whether the link's own platform restriction allows `os`.
    #[must_use]
    pub fn applies_to(&self, os: Os) -> bool {
        self.platforms.is_empty() || self.platforms.contains(&os)
    }
}

/// Declared registry value data.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RegistryValue {
    /// Integer data (stored as `DWORD` unless `kind` says otherwise).
    Number(u64),
    /// String data. `0x`-prefixed strings are treated as hex integers.
    Text(String),
}

impl fmt::Display for RegistryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Registry value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryKind {
    /// `REG_SZ`.
    String,
    /// `REG_EXPAND_SZ`.
    ExpandString,
    /// `REG_DWORD`.
    Dword,
    /// `REG_QWORD`.
    Qword,
}

/// One registry value a module manages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistryEntry {
    /// Key path, e.g. `HKCU\Software\Microsoft\Windows\CurrentVersion\Explorer\Advanced`.
    pub key: String,
    /// Value name.
    pub name: String,
    /// Desired data. Absent means the value should be deleted.
    #[serde(default)]
    pub value: Option<RegistryValue>,
    /// Explicit value type; inferred from `value` when absent.
    #[serde(default)]
    pub kind: Option<RegistryKind>,
}

impl RegistryEntry {
    /// `<key>\<name>`, used as the result target.
    #[must_use]
    pub fn display_path(&self) -> String {
        format!("{}\\{}", self.key, self.name)
    }

    /// Effective value type: the declared kind, or one inferred from the data.
    #[must_use]
    pub fn effective_kind(&self) -> RegistryKind {
        if let Some(kind) = self.kind {
            return kind;
        }
        match &self.value {
            Some(RegistryValue::Number(n)) if u32::try_from(*n).is_err() => RegistryKind::Qword,
            Some(RegistryValue::Number(_)) => RegistryKind::Dword,
            Some(RegistryValue::Text(s)) if parse_hex(s).is_some() => RegistryKind::Dword,
            _ => RegistryKind::String,
        }
    }
}

/// Parse a `0x`-prefixed hex string.
pub(crate) fn parse_hex(s: &str) -> Option<u64> {
    let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    u64::from_str_radix(hex, 16).ok()
}

/// Manager used for a module's global (language-level) packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlobalPackageManager {
    /// `npm install -g`.
    Npm,
    /// `bun add -g`.
    Bun,
}

impl fmt::Display for GlobalPackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Npm => write!(f, "npm"),
            Self::Bun => write!(f, "bun"),
        }
    }
}

/// Global packages installed through a language package manager.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GlobalPackages {
    /// Package manager to use.
    pub manager: GlobalPackageManager,
    /// Package names.
    #[serde(default)]
    pub packages: Vec<String>,
}

/// Scripts run around a module's deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Hooks {
    /// Script run before anything else in the module (real runs only).
    #[serde(default)]
    pub pre_deploy: Option<String>,
    /// Script run after the module succeeded (real runs only).
    #[serde(default)]
    pub post_deploy: Option<String>,
}

/// A git clean filter registered for files in the module.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CleanFilter {
    /// Filter name (`filter.<name>.clean`).
    pub name: String,
    /// Filter script, relative to the module directory.
    pub script: String,
    /// Files inside the module the filter applies to.
    #[serde(default)]
    pub files: Vec<String>,
}

/// A fully parsed module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Directory name; the module key.
    pub name: String,
    /// Name shown to the user.
    pub display_name: String,
    /// Whether the module is deployed at all.
    pub enabled: bool,
    /// Absolute module directory.
    pub path: PathBuf,
    /// Platforms the module applies to (empty = all).
    pub platforms: Vec<Os>,
    /// Declared links.
    pub links: Vec<LinkEntry>,
    /// Managed registry values.
    pub registry: Vec<RegistryEntry>,
    /// Directories to add to the user PATH.
    pub path_entries: Vec<String>,
    /// Global language packages.
    pub global_packages: Option<GlobalPackages>,
    /// VS Code extension identifiers.
    pub vscode_extensions: Vec<String>,
    /// `PowerShell` module names.
    pub ps_modules: Vec<String>,
    /// Pre/post deploy scripts.
    pub hooks: Hooks,
    /// Optional git clean filter.
    pub clean_filter: Option<CleanFilter>,
    /// Only deploy when this winget package is installed.
    pub winget_id: Option<String>,
}

impl Module {
    /// Parse a module manifest.
    ///
    /// `name` is the module directory name and `path` its absolute location.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message when the TOML is invalid or a link
    /// entry is incomplete.
    pub fn parse(name: &str, path: &Path, content: &str) -> Result<Self, String> {
        let raw: RawModule =
            toml_loader::parse_str(content, "module.toml").map_err(|e| e.to_string())?;

        let links = raw
            .links
            .into_iter()
            .enumerate()
            .map(|(i, link)| link.validate(i))
            .collect::<Result<Vec<_>, _>>()?;

        let display_name = raw
            .display_name
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| name.to_string());

        Ok(Self {
            name: name.to_string(),
            display_name,
            enabled: raw.enabled,
            path: path.to_path_buf(),
            platforms: raw.platforms,
            links,
            registry: raw.registry,
            path_entries: raw.path_entries,
            global_packages: raw.global_packages,
            vscode_extensions: raw.vscode_extensions,
            ps_modules: raw.ps_modules,
            hooks: raw.hooks,
            clean_filter: raw.clean_filter,
            winget_id: raw.winget_id.filter(|id| !id.trim().is_empty()),
        })
    }

    /// Whether the module declares `os` (or declares no platforms).
    #[must_use]
    pub fn supports(&self, os: Os) -> bool {
        self.platforms.is_empty() || self.platforms.contains(&os)
    }
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RawModule {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    platforms: Vec<Os>,
    #[serde(default)]
    links: Vec<RawLink>,
    #[serde(default)]
    registry: Vec<RegistryEntry>,
    #[serde(default)]
    path_entries: Vec<String>,
    #[serde(default)]
    global_packages: Option<GlobalPackages>,
    #[serde(default)]
    vscode_extensions: Vec<String>,
    #[serde(default)]
    ps_modules: Vec<String>,
    #[serde(default)]
    hooks: Hooks,
    #[serde(default)]
    clean_filter: Option<CleanFilter>,
    #[serde(default)]
    winget_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLink {
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    targets: Option<HashMap<Os, String>>,
    #[serde(default)]
    kind: LinkKind,
    #[serde(default)]
    template: bool,
    #[serde(default)]
    platforms: Vec<Os>,
}

impl RawLink {
    fn validate(self, index: usize) -> Result<LinkEntry, String> {
        let source = self
            .source
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| format!("Link [{index}] is missing 'source'."))?;

        let target = match (self.target, self.targets) {
            (Some(t), None) if !t.trim().is_empty() => LinkTarget::All(t),
            (None, Some(map)) if !map.is_empty() => LinkTarget::PerPlatform(map),
            (None, None) => return Err(format!("Link [{index}] is missing 'target'.")),
            _ => return Err(format!("Link [{index}] has an invalid 'target'.")),
        };

        Ok(LinkEntry {
            source,
            target,
            kind: self.kind,
            template: self.template,
            platforms: self.platforms,
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<Module, String> {
        Module::parse("git", Path::new("/repo/git"), content)
    }

    #[test]
    fn minimal_module_defaults() {
        let module = parse("").unwrap();
        assert_eq!(module.name, "git");
        assert_eq!(module.display_name, "git");
        assert!(module.enabled);
        assert!(module.platforms.is_empty());
        assert!(module.links.is_empty());
        assert!(module.winget_id.is_none());
    }

    #[test]
    fn parses_full_manifest() {
        let module = parse(
            r#"
display_name = "Git"
enabled = false
platforms = ["windows", "linux"]
winget_id = "Git.Git"
path_entries = ["C:/tools/bin"]
vscode_extensions = ["eamodio.gitlens"]
ps_modules = ["posh-git"]

[[links]]
source = ".gitconfig"
target = "$HOME/.gitconfig"

[[links]]
source = "ignore"
kind = "junction"
template = true
[links.targets]
windows = "%USERPROFILE%/ignore"

[[registry]]
key = 'HKCU\Software\Test'
name = "Number"
value = 1

[[registry]]
key = 'HKCU\Software\Test'
name = "Gone"

[global_packages]
manager = "bun"
packages = ["typescript"]

[hooks]
pre_deploy = "setup.sh"

[clean_filter]
name = "strip"
script = "clean.sh"
files = ["settings.json"]
"#,
        )
        .unwrap();

        assert_eq!(module.display_name, "Git");
        assert!(!module.enabled);
        assert_eq!(module.platforms, vec![Os::Windows, Os::Linux]);
        assert_eq!(module.winget_id.as_deref(), Some("Git.Git"));
        assert_eq!(module.links.len(), 2);
        assert_eq!(
            module.links[0].target_for(Os::MacOs),
            Some("$HOME/.gitconfig")
        );
        assert_eq!(module.links[1].kind, LinkKind::Junction);
        assert!(module.links[1].template);
        assert_eq!(
            module.links[1].target_for(Os::Windows),
            Some("%USERPROFILE%/ignore")
        );
        assert_eq!(module.links[1].target_for(Os::Linux), None);
        assert_eq!(module.registry[0].value, Some(RegistryValue::Number(1)));
        assert_eq!(module.registry[1].value, None);
        let globals = module.global_packages.unwrap();
        assert_eq!(globals.manager, GlobalPackageManager::Bun);
        assert_eq!(module.hooks.pre_deploy.as_deref(), Some("setup.sh"));
        assert_eq!(module.clean_filter.unwrap().files, vec!["settings.json"]);
    }

    #[test]
    fn link_missing_source_is_error() {
        let err = parse("[[links]]\ntarget = \"x\"\n").unwrap_err();
        assert_eq!(err, "Link [0] is missing 'source'.");
    }

    #[test]
    fn link_missing_target_is_error() {
        let err = parse("[[links]]\nsource = \"a\"\n\n[[links]]\nsource = \"b\"\n").unwrap_err();
        assert_eq!(err, "Link [0] is missing 'target'.");
    }

    #[test]
    fn link_with_both_target_forms_is_invalid() {
        let err = parse(
            "[[links]]\nsource = \"a\"\ntarget = \"x\"\n[links.targets]\nlinux = \"y\"\n",
        )
        .unwrap_err();
        assert_eq!(err, "Link [0] has an invalid 'target'.");
    }

    #[test]
    fn invalid_toml_is_error() {
        let err = parse("links = 5").unwrap_err();
        assert!(err.starts_with("Invalid TOML in module.toml"), "{err}");
    }

    #[test]
    fn link_platform_restriction() {
        let module =
            parse("[[links]]\nsource = \"a\"\ntarget = \"b\"\nplatforms = [\"macos\"]\n").unwrap();
        assert!(module.links[0].applies_to(Os::MacOs));
        assert!(!module.links[0].applies_to(Os::Linux));
    }

    #[test]
    fn registry_kind_inference() {
        let entry = |value: Option<RegistryValue>| RegistryEntry {
            key: "HKCU\\K".to_string(),
            name: "N".to_string(),
            value,
            kind: None,
        };
        assert_eq!(
            entry(Some(RegistryValue::Number(1))).effective_kind(),
            RegistryKind::Dword
        );
        assert_eq!(
            entry(Some(RegistryValue::Number(u64::from(u32::MAX) + 1))).effective_kind(),
            RegistryKind::Qword
        );
        assert_eq!(
            entry(Some(RegistryValue::Text("0x0E".to_string()))).effective_kind(),
            RegistryKind::Dword
        );
        assert_eq!(
            entry(Some(RegistryValue::Text("dark".to_string()))).effective_kind(),
            RegistryKind::String
        );
        assert_eq!(entry(None).display_path(), "HKCU\\K\\N");
    }
}
