//! System packages and fonts: resolve declared ids to concrete
//! (name, manager) packages for this machine, then install them one by one.
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use super::result::{DeployResult, ResultLevel};
use crate::config::packages::{PackageList, load_install_manifest, load_package_list};
use crate::config::{
    InstallDefinition, InstallManifest, PackageCatalog, PackageDefinition, PackageManager,
};
use crate::error::ConfigError;
use crate::exec::Executor;
use crate::platform::Os;
use crate::resources::package::{InstalledSet, PackageResource};
use crate::resources::{Applicable as _, ResourceChange};

/// Section name for system packages.
pub const SYSTEM_PACKAGES: &str = "System Packages";
/// Section name for fonts.
pub const FONTS: &str = "Fonts";

/// Where the run's system packages are declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    /// Structured `install.toml`.
    Manifest(InstallManifest),
    /// Legacy flat `packages.toml`.
    List(PackageList),
}

impl PackageSource {
    /// `install.toml` when present, otherwise `packages.toml`, otherwise `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the chosen file exists but cannot be parsed.
    pub fn load(repo: &Path) -> Result<Option<Self>, ConfigError> {
        if let Some(manifest) = load_install_manifest(repo)? {
            return Ok(Some(Self::Manifest(manifest)));
        }
        Ok(load_package_list(repo)?.map(Self::List))
    }
}

/// A package to install, with its installed state already decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    /// Package and manager.
    pub package: PackageDefinition,
    /// Present in the run's [`InstalledSet`] under its name or an alternative id.
    pub installed: bool,
}

/// Outcome of resolving one section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallResolution {
    /// Deduplicated packages in declaration order.
    pub packages: Vec<ResolvedPackage>,
    /// One message per id that could not be resolved.
    pub errors: Vec<String>,
}

impl InstallResolution {
    fn push(
        &mut self,
        seen: &mut HashSet<(String, PackageManager)>,
        package: PackageDefinition,
        installed: &InstalledSet,
    ) {
        if seen.insert((package.name.to_lowercase(), package.manager)) {
            let installed = installed.contains_package(&package);
            self.packages.push(ResolvedPackage { package, installed });
        }
    }
}

/// Maps declared ids to packages through a [`PackageCatalog`].
#[derive(Debug, Clone)]
pub struct InstallResolver {
    catalog: Arc<dyn PackageCatalog>,
}

impl InstallResolver {
    /// Create a resolver over `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<dyn PackageCatalog>) -> Self {
        Self { catalog }
    }

    /// Resolve the system packages of `source` for `machine` on `os`.
    ///
    /// Errors are collected, never raised; packages on other platforms are
    /// silently skipped.
    #[must_use]
    pub fn resolve(
        &self,
        source: &PackageSource,
        machine: &str,
        os: Os,
        installed: &InstalledSet,
    ) -> InstallResolution {
        match source {
            PackageSource::Manifest(manifest) => {
                self.resolve_catalog_ids(&app_ids(manifest, machine), os, installed)
            }
            PackageSource::List(list) => {
                let mut resolution = InstallResolution {
                    errors: list.errors.clone(),
                    ..InstallResolution::default()
                };
                let mut seen = HashSet::new();
                for package in &list.packages {
                    if package.manager.is_platform_match(os) {
                        resolution.push(&mut seen, package.clone(), installed);
                    }
                }
                resolution
            }
        }
    }

    /// Resolve the manifest's fonts. Flat package lists declare no fonts.
    #[must_use]
    pub fn resolve_fonts(
        &self,
        source: &PackageSource,
        os: Os,
        installed: &InstalledSet,
    ) -> InstallResolution {
        match source {
            PackageSource::Manifest(manifest) => {
                self.resolve_catalog_ids(&manifest.fonts, os, installed)
            }
            PackageSource::List(_) => InstallResolution::default(),
        }
    }

    fn resolve_catalog_ids(
        &self,
        ids: &[String],
        os: Os,
        installed: &InstalledSet,
    ) -> InstallResolution {
        let mut resolution = InstallResolution::default();
        let mut seen = HashSet::new();
        for id in ids {
            let entry = match self.catalog.lookup(id) {
                Ok(entry) => entry,
                Err(e) => {
                    resolution
                        .errors
                        .push(format!("Failed to load gallery entry '{id}': {e:#}"));
                    continue;
                }
            };
            let Some(install) = entry.and_then(|e| e.install) else {
                resolution.errors.push(format!(
                    "Gallery entry '{id}' not found or has no install metadata."
                ));
                continue;
            };
            match package_for(&install, os) {
                Some(package) => resolution.push(&mut seen, package, installed),
                None => tracing::debug!("{id}: no package for {os}"),
            }
        }
        resolution
    }
}

/// `apps` plus the machine's `add`, minus its `exclude`; case-insensitive,
/// first occurrence wins.
fn app_ids(manifest: &InstallManifest, machine: &str) -> Vec<String> {
    let overrides = manifest
        .machines
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(machine))
        .map(|(_, o)| o);

    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    let added = overrides.map_or(&[][..], |o| o.add.as_slice());
    for id in manifest.apps.iter().chain(added) {
        if seen.insert(id.to_lowercase()) {
            ids.push(id.clone());
        }
    }
    if let Some(overrides) = overrides {
        ids.retain(|id| !overrides.exclude.iter().any(|x| x.eq_ignore_ascii_case(id)));
    }
    ids
}

/// Platform mapping of one catalog entry. On Windows winget is preferred
/// and both winget and choco ids count as installed.
fn package_for(install: &InstallDefinition, os: Os) -> Option<PackageDefinition> {
    let non_empty = |id: &Option<String>| id.as_ref().filter(|s| !s.trim().is_empty()).cloned();
    match os {
        Os::Windows => {
            let winget = non_empty(&install.winget);
            let choco = non_empty(&install.choco);
            let alternative_ids: Vec<String> =
                winget.iter().chain(choco.iter()).cloned().collect();
            let (name, manager) = match (winget, choco) {
                (Some(id), _) => (id, PackageManager::Winget),
                (None, Some(id)) => (id, PackageManager::Choco),
                (None, None) => return None,
            };
            Some(PackageDefinition {
                name,
                manager,
                alternative_ids,
            })
        }
        Os::Linux => {
            non_empty(&install.apt).map(|id| PackageDefinition::new(id, PackageManager::Apt))
        }
        Os::MacOs => {
            non_empty(&install.brew).map(|id| PackageDefinition::new(id, PackageManager::Brew))
        }
    }
}

/// Installs resolved system packages through an [`Executor`].
#[derive(Debug, Clone)]
pub struct SystemPackageInstaller {
    executor: Arc<dyn Executor>,
}

impl SystemPackageInstaller {
    /// Create an installer.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    /// Install one package, or on a dry run report the command.
    ///
    /// Installed packages are reported `Synced` without spawning anything.
    #[must_use]
    pub fn install(
        &self,
        section: &str,
        resolved: &ResolvedPackage,
        dry_run: bool,
    ) -> DeployResult {
        let package = &resolved.package;
        let result = |level, message: String| {
            DeployResult::action(section, "", package.name.clone(), level, message)
        };

        if resolved.installed {
            return result(
                ResultLevel::Synced,
                format!("{} already installed", package.name),
            );
        }

        let resource =
            PackageResource::new(
                package.clone(),
                resolved.installed,
                Arc::clone(&self.executor),
            );
        let Some(command) = resource.command_line() else {
            return result(
                ResultLevel::Ok,
                format!(
                    "Skipped {} ({} handled elsewhere)",
                    package.name,
                    package.manager
                ),
            );
        };

        if dry_run {
            return result(ResultLevel::Ok, format!("Would install: {command}"));
        }

        match resource.apply() {
            Ok(ResourceChange::Applied) => result(
                ResultLevel::Ok,
                format!("Installed {} via {}", package.name, package.manager),
            ),
            Ok(ResourceChange::AlreadyCorrect) => result(
                ResultLevel::Synced,
                format!("{} already installed", package.name),
            ),
            Ok(ResourceChange::Failed { message }) => result(ResultLevel::Error, message),
            Err(e) => result(ResultLevel::Error, format!("{e:#}")),
        }
    }

    /// Dry-run results for a whole section: errors first, then packages.
    #[must_use]
    pub fn preview(&self, section: &str, resolution: &InstallResolution) -> Vec<DeployResult> {
        resolution
            .errors
            .iter()
            .map(|e| DeployResult::action(section, "", "", ResultLevel::Error, e.clone()))
            .chain(
                resolution
                    .packages
                    .iter()
                    .map(|p| self.install(section, p, true)),
            )
            .collect()
    }
}
