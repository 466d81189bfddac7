//! Package catalog (`<repo>/catalog.toml`): maps catalog ids to the
//! per-manager package identifiers used by the install resolver.
use anyhow::{Result, anyhow};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::toml_loader;

/// Per-manager identifiers for one catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InstallDefinition {
    /// winget package id (Windows, preferred).
    #[serde(default)]
    pub winget: Option<String>,
    /// Chocolatey package name (Windows fallback).
    #[serde(default)]
    pub choco: Option<String>,
    /// apt package name (Linux).
    #[serde(default)]
    pub apt: Option<String>,
    /// Homebrew formula or cask (macOS).
    #[serde(default)]
    pub brew: Option<String>,
}

/// One catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CatalogEntry {
    /// Human-readable name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Install metadata; entries without it cannot be installed.
    #[serde(default)]
    pub install: Option<InstallDefinition>,
}

/// Lookup of catalog ids.
#[cfg_attr(test, mockall::automock)]
pub trait PackageCatalog: Send + Sync + std::fmt::Debug {
    /// Find the entry for `id`.
    ///
    /// Returns `Ok(None)` when the id is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error when the catalog itself cannot be loaded.
    fn lookup(&self, id: &str) -> Result<Option<CatalogEntry>>;
}

/// Catalog backed by a TOML file whose top-level tables are catalog ids.
///
/// The file is read on first lookup and cached for the lifetime of the value.
#[derive(Debug)]
pub struct TomlPackageCatalog {
    path: PathBuf,
    entries: OnceLock<Result<HashMap<String, CatalogEntry>, String>>,
}

impl TomlPackageCatalog {
    /// Catalog at `<repo>/catalog.toml`.
    #[must_use]
    pub fn in_repo(repo: &Path) -> Self {
        Self::new(repo.join("catalog.toml"))
    }

    /// Catalog at an explicit path.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self {
            path,
            entries: OnceLock::new(),
        }
    }

    fn entries(&self) -> Result<&HashMap<String, CatalogEntry>> {
        self.entries
            .get_or_init(|| {
                if !self.path.exists() {
                    return Ok(HashMap::new());
                }
                toml_loader::load_config(&self.path).map_err(|e| e.to_string())
            })
            .as_ref()
            .map_err(|e| anyhow!("{e}"))
    }
}

impl PackageCatalog for TomlPackageCatalog {
    fn lookup(&self, id: &str) -> Result<Option<CatalogEntry>> {
        let entries = self.entries()?;
        Ok(entries
            .get(id)
            .or_else(|| {
                entries
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(id))
                    .map(|(_, entry)| entry)
            })
            .cloned())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn catalog(content: &str) -> (tempfile::TempDir, TomlPackageCatalog) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("catalog.toml"), content).unwrap();
        let catalog = TomlPackageCatalog::in_repo(dir.path());
        (dir, catalog)
    }

    #[test]
    fn lookup_finds_entry_case_insensitively() {
        let (_dir, catalog) = catalog(
            "[git]\ndisplay_name = \"Git\"\n[git.install]\nwinget = \"Git.Git\"\nchoco = \"git\"\n",
        );
        let entry = catalog.lookup("GIT").unwrap().unwrap();
        let install = entry.install.unwrap();
        assert_eq!(install.winget.as_deref(), Some("Git.Git"));
        assert_eq!(install.choco.as_deref(), Some("git"));
        assert!(install.apt.is_none());
    }

    #[test]
    fn unknown_id_is_none() {
        let (_dir, catalog) = catalog("[git]\n");
        assert!(catalog.lookup("vim").unwrap().is_none());
        assert!(catalog.lookup("git").unwrap().unwrap().install.is_none());
    }

    #[test]
    fn missing_catalog_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = TomlPackageCatalog::in_repo(dir.path());
        assert!(catalog.lookup("git").unwrap().is_none());
    }

    #[test]
    fn invalid_catalog_fails_every_lookup() {
        let (_dir, catalog) = catalog("[git\n");
        assert!(catalog.lookup("git").is_err());
        assert!(catalog.lookup("vim").is_err());
    }
}
