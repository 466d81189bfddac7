//! The deploy run: discovery, filtering, snapshot, modules, system packages,
//! fonts and clean filters, streamed as [`DeployResult`]s.
use std::cell::{Cell, LazyCell};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::confirm::{Confirmer, ModuleAction};
use super::context::Context;
use super::install::{
    FONTS, InstallResolution, InstallResolver, PackageSource, SYSTEM_PACKAGES,
    SystemPackageInstaller,
};
use super::module::ModuleSteps;
use super::progress::{Progress, Reporter};
use super::result::{DeployEventType, DeployResult, ResultLevel};
use crate::config::{MachineProfile, Module};
use crate::platform::Os;
use crate::resources::clean_filter::CleanFilterResource;
use crate::resources::package::InstalledSet;
use crate::resources::{Applicable as _, ResourceChange};

/// Module name for discovery and machine profile errors.
pub const DISCOVERY: &str = "discovery";

/// Options for one deploy run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeployOptions {
    /// Report what would change without changing anything.
    pub dry_run: bool,
}

/// Runs deploys and status checks against one [`Context`].
#[derive(Debug, Clone)]
pub struct Orchestrator {
    ctx: Context,
}

/// Parsed modules and the machine profile of one run.
#[derive(Debug)]
pub(crate) struct Discovered {
    pub(crate) modules: Vec<Module>,
    pub(crate) profile: MachineProfile,
}

/// Whether a checkpoint lets the run continue.
enum Flow {
    Continue,
    Stop(i32),
}

impl Orchestrator {
    /// Create an orchestrator over `ctx`.
    #[must_use]
    pub const fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// The collaborators this orchestrator runs with.
    #[must_use]
    pub const fn context(&self) -> &Context {
        &self.ctx
    }

    /// Deploy every eligible module of `repo`, then system packages, fonts
    /// and clean filters.
    ///
    /// Returns `1` if any error was reported, `0` otherwise. An operator
    /// abort returns `0` immediately; a cancellation stops at the next
    /// checkpoint and returns the code accumulated so far.
    pub fn deploy(
        &self,
        repo: &Path,
        options: &DeployOptions,
        progress: &dyn Progress,
        confirmer: &dyn Confirmer,
    ) -> i32 {
        let reporter = Reporter::new(progress);
        let dry_run = options.dry_run;
        let os = self.ctx.platform.os();
        tracing::debug!(
            "deploy {} on {os} as {} (dry run: {dry_run})",
            repo.display(),
            self.ctx.machine_name
        );

        let discovered = self.discover(repo, &reporter);
        let installed = LazyCell::new(|| self.ctx.installed.installed_packages());
        let eligible: Vec<&Module> = discovered
            .modules
            .iter()
            .filter(|module| {
                let reason = skip_reason(module, os, &discovered.profile).or_else(|| {
                    module
                        .winget_id
                        .as_ref()
                        .filter(|id| !installed.contains(id))
                        .map(|id| format!("Skipped ({id} not installed)"))
                });
                let (event, message) = match reason {
                    Some(reason) => (DeployEventType::ModuleSkipped, reason),
                    None => (DeployEventType::ModuleDiscovered, String::new()),
                };
                reporter.report(&DeployResult::module_event(
                    &module.display_name,
                    event,
                    ResultLevel::Ok,
                    message,
                ));
                event == DeployEventType::ModuleDiscovered
            })
            .collect();

        let steps = ModuleSteps::new(&self.ctx, repo, &discovered.profile.variables);
        if !dry_run {
            self.snapshot(&steps, &discovered.modules);
        }

        for module in eligible {
            if let Flow::Stop(code) =
                self.deploy_module(&steps, module, dry_run, &reporter, confirmer)
            {
                return code;
            }
        }

        if let Flow::Stop(code) =
            self.system_packages(repo, dry_run, &installed, &reporter, confirmer)
        {
            return code;
        }

        if !dry_run {
            self.clean_filters(repo, &discovered.modules, &reporter);
        }

        reporter.exit_code()
    }

    /// Discovery plus machine profile. Errors from either are reported under
    /// [`DISCOVERY`].
    pub(crate) fn discover(&self, repo: &Path, reporter: &Reporter<'_>) -> Discovered {
        let discovery = self.ctx.modules.discover(repo);
        for error in discovery.errors {
            reporter.report(&DeployResult::action(
                DISCOVERY,
                "",
                "",
                ResultLevel::Error,
                error,
            ));
        }

        let profile = match self.ctx.profiles.load(repo) {
            Ok(profile) => profile.unwrap_or_default(),
            Err(e) => {
                reporter.report(&DeployResult::action(
                    DISCOVERY,
                    "",
                    "",
                    ResultLevel::Error,
                    e.to_string(),
                ));
                MachineProfile::default()
            }
        };

        Discovered {
            modules: discovery.modules,
            profile,
        }
    }

    fn snapshot(&self, steps: &ModuleSteps<'_>, modules: &[Module]) {
        let paths: Vec<PathBuf> = modules
            .iter()
            .flat_map(|module| steps.target_paths(module))
            .collect();
        match self.ctx.snapshots.create_snapshot(&paths, &self.ctx.cancel) {
            Ok(Some(snapshot)) => tracing::debug!(
                "snapshot {} holds {} entr(ies)",
                snapshot.id,
                snapshot.entries.len()
            ),
            Ok(None) => tracing::debug!("no existing targets to snapshot"),
            Err(e) => tracing::warn!("snapshot failed: {e:#}"),
        }
    }

    fn deploy_module(
        &self,
        steps: &ModuleSteps<'_>,
        module: &Module,
        dry_run: bool,
        reporter: &Reporter<'_>,
        confirmer: &dyn Confirmer,
    ) -> Flow {
        if self.ctx.cancel.is_cancelled() {
            return Flow::Stop(reporter.exit_code());
        }
        let name = module.display_name.as_str();

        let preview = if confirmer.wants_preview() {
            steps.preview(module, !dry_run)
        } else {
            Vec::new()
        };
        match confirmer.before_module(name, &preview) {
            ModuleAction::Proceed => {}
            ModuleAction::Skip => {
                reporter.report(&DeployResult::module_event(
                    name,
                    DeployEventType::ModuleSkipped,
                    ResultLevel::Ok,
                    "Skipped (user)",
                ));
                return Flow::Continue;
            }
            ModuleAction::Abort => return Flow::Stop(0),
        }

        reporter.report(&DeployResult::module_event(
            name,
            DeployEventType::ModuleStarted,
            ResultLevel::Ok,
            "",
        ));

        let failed = Cell::new(false);
        let mut emit = |result: DeployResult| {
            failed.set(failed.get() | result.is_error());
            reporter.report(&result);
        };

        let pre_hook_ok = match module.hooks.pre_deploy.as_deref() {
            Some(script) if !dry_run => {
                let result = steps.run_hook(module, script);
                let ok = !result.is_error();
                emit(result);
                ok
            }
            _ => true,
        };

        if pre_hook_ok {
            steps.converge(module, dry_run, &mut emit);
            if let Some(script) = module.hooks.post_deploy.as_deref()
                && !dry_run
                && !failed.get()
                && !self.ctx.cancel.is_cancelled()
            {
                emit(steps.run_hook(module, script));
            }
        }

        let level = if failed.get() {
            ResultLevel::Error
        } else {
            ResultLevel::Ok
        };
        reporter.report(&DeployResult::module_event(
            name,
            DeployEventType::ModuleCompleted,
            level,
            "",
        ));

        if self.ctx.cancel.is_cancelled() {
            Flow::Stop(reporter.exit_code())
        } else {
            Flow::Continue
        }
    }

    fn system_packages(
        &self,
        repo: &Path,
        dry_run: bool,
        installed: &InstalledSet,
        reporter: &Reporter<'_>,
        confirmer: &dyn Confirmer,
    ) -> Flow {
        let source = match PackageSource::load(repo) {
            Ok(Some(source)) => source,
            Ok(None) => return Flow::Continue,
            Err(e) => {
                reporter.report(&DeployResult::action(
                    SYSTEM_PACKAGES,
                    "",
                    "",
                    ResultLevel::Error,
                    e.to_string(),
                ));
                return Flow::Continue;
            }
        };

        let os = self.ctx.platform.os();
        let resolver = InstallResolver::new(Arc::clone(&self.ctx.packages));
        let installer = SystemPackageInstaller::new(Arc::clone(&self.ctx.executor));

        let apps = resolver.resolve(&source, &self.ctx.machine_name, os, installed);
        if let Flow::Stop(code) =
            self.section(
                SYSTEM_PACKAGES,
                &apps,
                &installer,
                dry_run,
                reporter,
                confirmer,
            )
        {
            return Flow::Stop(code);
        }

        let fonts = resolver.resolve_fonts(&source, os, installed);
        self.section(FONTS, &fonts, &installer, dry_run, reporter, confirmer)
    }

    fn section(
        &self,
        name: &str,
        resolution: &InstallResolution,
        installer: &SystemPackageInstaller,
        dry_run: bool,
        reporter: &Reporter<'_>,
        confirmer: &dyn Confirmer,
    ) -> Flow {
        if resolution.packages.is_empty() && resolution.errors.is_empty() {
            return Flow::Continue;
        }
        if self.ctx.cancel.is_cancelled() {
            return Flow::Stop(reporter.exit_code());
        }

        let preview = if confirmer.wants_preview() {
            installer.preview(name, resolution)
        } else {
            Vec::new()
        };
        match confirmer.before_section(name, &preview) {
            ModuleAction::Proceed => {}
            ModuleAction::Skip => {
                reporter.report(&DeployResult::module_event(
                    name,
                    DeployEventType::ModuleSkipped,
                    ResultLevel::Ok,
                    "Skipped (user)",
                ));
                return Flow::Continue;
            }
            ModuleAction::Abort => return Flow::Stop(0),
        }

        for error in &resolution.errors {
            reporter.report(&DeployResult::action(
                name,
                "",
                "",
                ResultLevel::Error,
                error.clone(),
            ));
        }
        for package in &resolution.packages {
            if self.ctx.cancel.is_cancelled() {
                return Flow::Stop(reporter.exit_code());
            }
            reporter.report(&installer.install(name, package, dry_run));
        }
        Flow::Continue
    }

    /// Register the clean filter of every module of `repo` without
    /// deploying anything.
    ///
    /// Returns `1` if discovery or any registration reported an error, `0`
    /// otherwise.
    pub fn setup_clean_filters(&self, repo: &Path, progress: &dyn Progress) -> i32 {
        let reporter = Reporter::new(progress);
        let discovered = self.discover(repo, &reporter);
        if discovered.modules.iter().all(|m| m.clean_filter.is_none()) {
            tracing::info!("no clean filters defined");
        }
        self.clean_filters(repo, &discovered.modules, &reporter);
        reporter.exit_code()
    }

    fn clean_filters(&self, repo: &Path, modules: &[Module], reporter: &Reporter<'_>) {
        for module in modules {
            let Some(filter) = &module.clean_filter else {
                continue;
            };
            if self.ctx.cancel.is_cancelled() {
                return;
            }
            let resource = CleanFilterResource::new(repo, &module.name, filter.clone());
            let (level, message) = match resource.apply() {
                Ok(ResourceChange::Applied) => (
                    ResultLevel::Ok,
                    format!("Registered clean filter '{}'", filter.name),
                ),
                Ok(ResourceChange::AlreadyCorrect) => (
                    ResultLevel::Synced,
                    format!("Clean filter '{}' already registered", filter.name),
                ),
                Ok(ResourceChange::Failed { message }) => (ResultLevel::Error, message),
                Err(e) => (ResultLevel::Error, format!("{e:#}")),
            };
            reporter.report(&DeployResult::action(
                &module.display_name,
                "",
                "",
                level,
                message,
            ));
        }
    }
}

/// Why `module` is not deployed on this machine, checked in order: enabled,
/// platform, profile include list, profile exclude list.
pub(crate) fn skip_reason(module: &Module, os: Os, profile: &MachineProfile) -> Option<String> {
    if !module.enabled {
        return Some("Skipped (disabled)".to_string());
    }
    if !module.supports(os) {
        return Some(format!("Skipped (not for {os})"));
    }
    if !profile.include_modules.is_empty() && !profile.includes(&module.name) {
        return Some("Skipped (not in machine profile)".to_string());
    }
    if profile.excludes(&module.name) {
        return Some("Skipped (excluded by machine profile)".to_string());
    }
    None
}
