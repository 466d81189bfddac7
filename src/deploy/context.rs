//! Per-run deploy context shared by the orchestrator and its collaborators.

use std::path::Path;
use std::sync::Arc;

use super::cancel::CancellationToken;
use super::snapshot::{FsSnapshotProvider, SnapshotProvider};
use crate::config::machine::host_name;
use crate::config::{
    MachineProfileSource, ModuleCatalog, PackageCatalog, Settings, TomlMachineProfileSource,
    TomlModuleCatalog, TomlPackageCatalog,
};
use crate::exec::{Executor, SystemExecutor};
use crate::paths::{FsGlobResolver, GlobResolver};
use crate::platform::Platform;
use crate::resources::link::{LinkProvider, SystemLinkProvider};
use crate::resources::package::{InstalledPackageChecker, SystemInstalledPackageChecker};
use crate::resources::path_env::{self, PathService};
use crate::resources::registry::{self, RegistryProvider};
use crate::template::{
    MachineVariableResolver, OnePasswordResolver, ReferenceResolver, TemplateResolver,
    VariableResolver,
};

/// Every collaborator a deploy or status run needs.
///
/// All fields are shared trait objects so tests can swap any of them.
#[derive(Debug, Clone)]
pub struct Context {
    /// Detected platform.
    pub platform: Arc<Platform>,
    /// Machine name used for profile and install manifest lookups.
    pub machine_name: String,
    /// Process runner.
    pub executor: Arc<dyn Executor>,
    /// Module discovery.
    pub modules: Arc<dyn ModuleCatalog>,
    /// Machine profile loading.
    pub profiles: Arc<dyn MachineProfileSource>,
    /// Catalog id lookup for the install manifest.
    pub packages: Arc<dyn PackageCatalog>,
    /// Target glob expansion.
    pub globs: Arc<dyn GlobResolver>,
    /// Link primitives.
    pub links: Arc<dyn LinkProvider>,
    /// Registry access.
    pub registry: Arc<dyn RegistryProvider>,
    /// User PATH access.
    pub path_service: Arc<dyn PathService>,
    /// Installed package detection.
    pub installed: Arc<dyn InstalledPackageChecker>,
    /// `op://` reference resolution.
    pub references: Arc<dyn ReferenceResolver>,
    /// Template variable resolution.
    pub variables: Arc<dyn VariableResolver>,
    /// Pre-deploy snapshots.
    pub snapshots: Arc<dyn SnapshotProvider>,
    /// Ctrl-C flag.
    pub cancel: CancellationToken,
}

impl Context {
    /// The real collaborators for `repo`.
    ///
    /// `machine` overrides the settings file, which overrides the host name.
    #[must_use]
    pub fn system(
        repo: &Path,
        settings: &Settings,
        machine: Option<&str>,
        cancel: CancellationToken,
    ) -> Self {
        let platform = Platform::detect();
        let machine_name = machine
            .map(str::to_string)
            .or_else(|| settings.machine_name.clone())
            .unwrap_or_else(host_name);
        let executor: Arc<dyn Executor> = Arc::new(SystemExecutor);
        let links: Arc<dyn LinkProvider> = Arc::new(SystemLinkProvider);

        Self {
            machine_name: machine_name.clone(),
            executor: Arc::clone(&executor),
            modules: Arc::new(TomlModuleCatalog),
            profiles: Arc::new(TomlMachineProfileSource::new(machine_name.clone())),
            packages: Arc::new(TomlPackageCatalog::in_repo(repo)),
            globs: Arc::new(FsGlobResolver),
            links: Arc::clone(&links),
            registry: registry::system_provider(),
            path_service: path_env::system_service(),
            installed: Arc::new(SystemInstalledPackageChecker::new(
                Arc::clone(&executor),
                platform.os(),
            )),
            references: Arc::new(OnePasswordResolver::new(Arc::clone(&executor))),
            variables: Arc::new(MachineVariableResolver::new(machine_name, platform.os())),
            snapshots: Arc::new(FsSnapshotProvider::new(settings.backup_root(), links)),
            cancel,
            platform: Arc::new(platform),
        }
    }

    /// Template resolver over this context's resolvers.
    #[must_use]
    pub fn templates(&self) -> TemplateResolver {
        TemplateResolver::new(Arc::clone(&self.references), Arc::clone(&self.variables))
    }
}
