//! System package resource and installed-package detection.
use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;

use super::{Applicable, Resource, ResourceChange, ResourceState};
use crate::config::{PackageDefinition, PackageManager};
use crate::exec::{Executor, display_command};
use crate::platform::Os;

/// Identifiers of everything installed on the machine, collected once per run.
///
/// Lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledSet {
    ids: HashSet<String>,
}

impl InstalledSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an installed identifier.
    pub fn insert(&mut self, id: &str) {
        let id = id.trim();
        if !id.is_empty() {
            self.ids.insert(id.to_lowercase());
        }
    }

    /// Whether `id` is installed.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(&id.trim().to_lowercase())
    }

    /// Whether `package` is installed under its name or any alternative id.
    #[must_use]
    pub fn contains_package(&self, package: &PackageDefinition) -> bool {
        self.contains(&package.name) || package.alternative_ids.iter().any(|id| self.contains(id))
    }

    /// Number of recorded identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for InstalledSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for id in iter {
            set.insert(id.as_ref());
        }
        set
    }
}

/// Builds the [`InstalledSet`] for a run.
#[cfg_attr(test, mockall::automock)]
pub trait InstalledPackageChecker: Send + Sync + std::fmt::Debug {
    /// Query every available package manager once.
    fn installed_packages(&self) -> InstalledSet;
}

/// Queries the platform's package managers through an [`Executor`].
///
/// Managers that are not on `PATH` or whose query fails contribute nothing.
#[derive(Debug, Clone)]
pub struct SystemInstalledPackageChecker {
    executor: Arc<dyn Executor>,
    os: Os,
}

impl SystemInstalledPackageChecker {
    /// Create a checker for `os`.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>, os: Os) -> Self {
        Self { executor, os }
    }

    fn query(
        &self,
        set: &mut InstalledSet,
        program: &str,
        args: &[&str],
        parse: fn(&str) -> Vec<&str>,
    ) {
        if !self.executor.which(program) {
            return;
        }
        match self.executor.run_unchecked(program, args) {
            Ok(result) if result.success => {
                for id in parse(&result.stdout) {
                    set.insert(id);
                }
            }
            Ok(result) => tracing::debug!(
                "{} failed (exit {}): {}",
                display_command(program, args),
                result.exit_code(),
                result.detail()
            ),
            Err(e) => tracing::debug!("{program} query failed: {e:#}"),
        }
    }
}

impl InstalledPackageChecker for SystemInstalledPackageChecker {
    fn installed_packages(&self) -> InstalledSet {
        let mut set = InstalledSet::new();
        match self.os {
            Os::Windows => {
                self.query(
                    &mut set,
                    "winget",
                    &[
                        "list",
                        "--accept-source-agreements",
                        "--disable-interactivity",
                    ],
                    parse_winget_list,
                );
                self.query(
                    &mut set,
                    "choco",
                    &["list", "--limit-output"],
                    parse_choco_list,
                );
            }
            Os::Linux => self.query(
                &mut set,
                "dpkg-query",
                &["-W", "-f=${Package}\\n"],
                parse_name_per_line,
            ),
            Os::MacOs => {
                self.query(&mut set, "brew", &["list", "-1"], parse_name_per_line);
            }
        }
        tracing::debug!("installed package set: {} ids", set.len());
        set
    }
}

/// `winget list` prints a table; every whitespace token may be an id.
/// Winget ids are reverse-domain names so collisions with versions do not
/// produce false matches for exact lookups.
fn parse_winget_list(stdout: &str) -> Vec<&str> {
    stdout.lines().flat_map(str::split_whitespace).collect()
}

/// `choco list --limit-output` prints `name|version`.
fn parse_choco_list(stdout: &str) -> Vec<&str> {
    stdout
        .lines()
        .filter_map(|line| line.split('|').next())
        .collect()
}

fn parse_name_per_line(stdout: &str) -> Vec<&str> {
    stdout
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .collect()
}

/// Install command for managers handled by the system installer.
///
/// Returns `None` for language and editor managers, which modules handle.
#[must_use]
pub fn install_command(package: &PackageDefinition) -> Option<(&'static str, Vec<String>)> {
    let name = package.name.clone();
    match package.manager {
        PackageManager::Choco => Some(("choco", vec!["install".into(), name, "-y".into()])),
        PackageManager::Winget => Some((
            "winget",
            vec![
                "install".into(),
                "--id".into(),
                name,
                "--accept-source-agreements".into(),
                "--accept-package-agreements".into(),
            ],
        )),
        PackageManager::Apt => Some((
            "sudo",
            vec!["apt-get".into(), "install".into(), "-y".into(), name],
        )),
        PackageManager::Brew => Some(("brew", vec!["install".into(), name])),
        PackageManager::Npm
        | PackageManager::Bun
        | PackageManager::DotnetTool
        | PackageManager::Vscode
        | PackageManager::PsModule => None,
    }
}

/// A system package whose installed state was decided against the run's
/// [`InstalledSet`].
#[derive(Debug, Clone)]
pub struct PackageResource {
    /// Package to install.
    pub package: PackageDefinition,
    /// Whether the package (or an alternative id) is already present.
    pub installed: bool,
    executor: Arc<dyn Executor>,
}

impl PackageResource {
    /// Create a new package resource.
    #[must_use]
    pub fn new(package: PackageDefinition, installed: bool, executor: Arc<dyn Executor>) -> Self {
        Self {
            package,
            installed,
            executor,
        }
    }

    /// Rendered install command, `None` when another installer owns the
    /// package.
    #[must_use]
    pub fn command_line(&self) -> Option<String> {
        install_command(&self.package).map(|(program, args)| {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            display_command(program, &args)
        })
    }
}

impl Applicable for PackageResource {
    fn description(&self) -> String {
        format!("{} ({})", self.package.name, self.package.manager)
    }

    fn apply(&self) -> Result<ResourceChange> {
        if self.installed {
            return Ok(ResourceChange::AlreadyCorrect);
        }
        let Some((program, args)) = install_command(&self.package) else {
            return Ok(ResourceChange::AlreadyCorrect);
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let result = self.executor.run_unchecked(program, &args)?;
        if result.success {
            Ok(ResourceChange::Applied)
        } else {
            Ok(ResourceChange::Failed {
                message: super::helpers::cmd::failure_message(program, &args, &result),
            })
        }
    }
}

impl Resource for PackageResource {
    fn current_state(&self) -> Result<ResourceState> {
        Ok(if self.installed {
            ResourceState::Correct
        } else {
            ResourceState::Missing
        })
    }
}
