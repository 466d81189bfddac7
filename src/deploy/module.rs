//! Per-module steps: links, registry, PATH, global packages, VS Code
//! extensions, `PowerShell` modules and hooks.
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::context::Context;
use super::links::LinkReconciler;
use super::result::{DeployResult, ResultLevel};
use super::templates::TemplateLinker;
use crate::config::{LinkKind, Module, RegistryEntry};
use crate::paths;
use crate::platform::Os;
use crate::resources::global_package::GlobalPackageResource;
use crate::resources::hook::HookResource;
use crate::resources::path_env::PathEntryResource;
use crate::resources::ps_module::PsModuleResource;
use crate::resources::registry::RegistryResource;
use crate::resources::vscode_extension::{
    VsCodeExtensionResource, find_code_command, get_installed_extensions,
};
use crate::resources::{Applicable as _, Resource, ResourceChange, ResourceState};
use crate::template::TemplateResolver;

/// A link entry resolved against the current platform and variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ResolvedLink {
    /// No target declared for this platform.
    NoTarget {
        /// Raw source as written in the manifest.
        source: String,
    },
    /// The target expression matched nothing.
    NoMatch {
        /// Absolute source path.
        source: PathBuf,
        /// Expanded target expression.
        expression: String,
    },
    /// One or more concrete targets.
    Targets {
        /// Absolute source path.
        source: PathBuf,
        /// Glob matches, or the target itself.
        targets: Vec<PathBuf>,
        /// Symlink or junction.
        kind: LinkKind,
        /// Render through the template resolver first.
        template: bool,
    },
}

/// Runs the steps of one module against a [`Context`].
#[derive(Debug)]
pub(crate) struct ModuleSteps<'a> {
    ctx: &'a Context,
    repo: &'a Path,
    variables: &'a HashMap<String, String>,
    reconciler: LinkReconciler,
    templates: TemplateLinker,
}

impl<'a> ModuleSteps<'a> {
    pub(crate) fn new(
        ctx: &'a Context,
        repo: &'a Path,
        variables: &'a HashMap<String, String>,
    ) -> Self {
        let reconciler = LinkReconciler::new(
            Arc::clone(&ctx.links),
            ctx.platform.paths_case_insensitive(),
        );
        let templates = TemplateLinker::new(reconciler.clone(), ctx.templates(), repo);
        Self {
            ctx,
            repo,
            variables,
            reconciler,
            templates,
        }
    }

    fn os(&self) -> Os {
        self.ctx.platform.os()
    }

    fn cancelled(&self) -> bool {
        self.ctx.cancel.is_cancelled()
    }

    /// Resolve every link of `module` that applies to this platform.
    pub(crate) fn resolve_links(&self, module: &Module) -> Vec<ResolvedLink> {
        let os = self.os();
        module
            .links
            .iter()
            .filter(|link| link.applies_to(os))
            .map(|link| {
                let Some(target) = link.target_for(os) else {
                    return ResolvedLink::NoTarget {
                        source: link.source.clone(),
                    };
                };
                let source = module.path.join(&link.source);
                let expression = paths::expand(target, Some(self.variables));
                let targets = self.ctx.globs.resolve(&expression);
                if targets.is_empty() {
                    ResolvedLink::NoMatch { source, expression }
                } else {
                    ResolvedLink::Targets {
                        source,
                        targets,
                        kind: link.kind,
                        template: link.template,
                    }
                }
            })
            .collect()
    }

    /// Every concrete target path of `module`, for snapshots.
    pub(crate) fn target_paths(&self, module: &Module) -> Vec<PathBuf> {
        self.resolve_links(module)
            .into_iter()
            .flat_map(|link| match link {
                ResolvedLink::Targets { targets, .. } => targets,
                ResolvedLink::NoTarget { .. } | ResolvedLink::NoMatch { .. } => Vec::new(),
            })
            .collect()
    }

    /// The file a link target should point at: the generated file for
    /// templates, the source otherwise.
    pub(crate) fn link_source(&self, module: &Module, source: &Path, template: bool) -> PathBuf {
        if template {
            TemplateResolver::generated_path(self.repo, &module.name, source)
        } else {
            source.to_path_buf()
        }
    }

    /// Dry-run results for the confirmation prompt.
    ///
    /// Package-style steps spawn tools to check installed state, so they are
    /// only previewed when `include_packages` is set.
    pub(crate) fn preview(&self, module: &Module, include_packages: bool) -> Vec<DeployResult> {
        let mut results = Vec::new();
        let mut emit = |r: DeployResult| results.push(r);
        self.links(module, true, &mut emit);
        self.registry(module, true, &mut emit);
        self.path_entries(module, true, &mut emit);
        if include_packages {
            self.global_packages(module, true, &mut emit);
            self.vscode_extensions(module, true, &mut emit);
            self.ps_modules(module, true, &mut emit);
        }
        results
    }

    /// Every step between the hooks, in order.
    pub(crate) fn converge(
        &self,
        module: &Module,
        dry_run: bool,
        emit: &mut dyn FnMut(DeployResult),
    ) {
        self.links(module, dry_run, emit);
        self.registry(module, dry_run, emit);
        self.path_entries(module, dry_run, emit);
        self.global_packages(module, dry_run, emit);
        self.vscode_extensions(module, dry_run, emit);
        self.ps_modules(module, dry_run, emit);
    }

    /// Run a pre- or post-deploy hook from the module directory.
    pub(crate) fn run_hook(&self, module: &Module, script: &str) -> DeployResult {
        let hook = HookResource::new(&module.path, script, Arc::clone(&self.ctx.executor));
        let result = |level, message: String| {
            DeployResult::action(
                &module.display_name,
                hook.script.display().to_string(),
                "",
                level,
                message,
            )
        };
        match hook.apply() {
            Ok(ResourceChange::Applied | ResourceChange::AlreadyCorrect) => {
                result(ResultLevel::Ok, "Hook completed".to_string())
            }
            Ok(ResourceChange::Failed { message }) => result(ResultLevel::Error, message),
            Err(e) => result(ResultLevel::Error, format!("{e:#}")),
        }
    }

    fn links(&self, module: &Module, dry_run: bool, emit: &mut dyn FnMut(DeployResult)) {
        let name = module.display_name.as_str();
        for link in self.resolve_links(module) {
            if self.cancelled() {
                return;
            }
            match link {
                ResolvedLink::NoTarget { source } => emit(DeployResult::action(
                    name,
                    source,
                    "",
                    ResultLevel::Ok,
                    format!("Skipped (no target for {})", self.os()),
                )),
                ResolvedLink::NoMatch { source, expression } => emit(DeployResult::action(
                    name,
                    source.display().to_string(),
                    expression,
                    ResultLevel::Warning,
                    "No matches for glob pattern".to_string(),
                )),
                ResolvedLink::Targets {
                    source,
                    targets,
                    kind,
                    template,
                } => {
                    for target in targets {
                        if self.cancelled() {
                            return;
                        }
                        let result = if template {
                            self.templates.converge(
                                module,
                                &source,
                                &target,
                                kind,
                                self.variables,
                                dry_run,
                            )
                        } else {
                            self.reconciler
                                .converge(name, &source, &target, kind, dry_run)
                        };
                        emit(result);
                    }
                }
            }
        }
    }

    fn registry(&self, module: &Module, dry_run: bool, emit: &mut dyn FnMut(DeployResult)) {
        let os = self.os();
        for entry in &module.registry {
            if self.cancelled() {
                return;
            }
            let result = |level, message: String| {
                DeployResult::action(
                    &module.display_name,
                    "",
                    entry.display_path(),
                    level,
                    message,
                )
            };
            if os != Os::Windows {
                emit(result(
                    ResultLevel::Ok,
                    format!("Skipped (registry not supported on {os})"),
                ));
                continue;
            }
            let (level, message) = self.registry_entry(entry, dry_run);
            emit(result(level, message));
        }
    }

    fn registry_entry(&self, entry: &RegistryEntry, dry_run: bool) -> (ResultLevel, String) {
        let resource = RegistryResource::new(entry.clone(), Arc::clone(&self.ctx.registry));
        let current = match self.ctx.registry.get_value(&entry.key, &entry.name) {
            Ok(current) => current,
            Err(e) => return (ResultLevel::Error, format!("{e:#}")),
        };
        let already = || match &entry.value {
            Some(value) => format!("Registry {} already set to {value}", entry.name),
            None => format!("Registry {} already absent", entry.name),
        };
        if resource.state_from_current(current.as_deref()) == ResourceState::Correct {
            return (ResultLevel::Synced, already());
        }

        if dry_run {
            let message = match &entry.value {
                Some(value) => format!("Would set {} to {value}", entry.display_path()),
                None => format!("Would delete {}", entry.display_path()),
            };
            return (ResultLevel::Ok, message);
        }

        match resource.apply() {
            Ok(ResourceChange::Applied) => {
                let message = match &entry.value {
                    Some(value) => format!("Set {} to {value}", entry.name),
                    None => format!("Deleted {}", entry.name),
                };
                (ResultLevel::Ok, message)
            }
            Ok(ResourceChange::AlreadyCorrect) => (ResultLevel::Synced, already()),
            Ok(ResourceChange::Failed { message }) => (ResultLevel::Error, message),
            Err(e) => (ResultLevel::Error, format!("{e:#}")),
        }
    }

    fn path_entries(&self, module: &Module, dry_run: bool, emit: &mut dyn FnMut(DeployResult)) {
        for entry in &module.path_entries {
            if self.cancelled() {
                return;
            }
            let path = paths::expand(entry, Some(self.variables));
            let resource = PathEntryResource::new(path.clone(), Arc::clone(&self.ctx.path_service));
            let (level, message) = if dry_run {
                match resource.current_state() {
                    Ok(ResourceState::Correct) => {
                        (ResultLevel::Synced, format!("{path} already on PATH"))
                    }
                    Ok(_) => (ResultLevel::Ok, format!("Would add {path} to PATH")),
                    Err(e) => (ResultLevel::Error, format!("{e:#}")),
                }
            } else {
                match resource.apply() {
                    Ok(ResourceChange::Applied) => {
                        (ResultLevel::Ok, format!("Added {path} to PATH"))
                    }
                    Ok(ResourceChange::AlreadyCorrect) => {
                        (ResultLevel::Synced, format!("{path} already on PATH"))
                    }
                    Ok(ResourceChange::Failed { message }) => (ResultLevel::Error, message),
                    Err(e) => (ResultLevel::Error, format!("{e:#}")),
                }
            };
            emit(DeployResult::action(
                &module.display_name,
                "",
                path,
                level,
                message,
            ));
        }
    }

    fn global_packages(&self, module: &Module, dry_run: bool, emit: &mut dyn FnMut(DeployResult)) {
        let Some(global) = &module.global_packages else {
            return;
        };
        let tool = global.manager.to_string();
        let available = self.ctx.executor.which(&tool);
        for package in &global.packages {
            if self.cancelled() {
                return;
            }
            let result = |level, message: String| {
                DeployResult::action(&module.display_name, "", package.clone(), level, message)
            };
            if !available {
                emit(tool_missing(&tool, package, result));
                continue;
            }
            let resource = GlobalPackageResource::new(
                package.clone(),
                global.manager,
                Arc::clone(&self.ctx.executor),
            );
            let (level, message) = install_outcome(
                &resource,
                dry_run,
                package,
                &resource.command_line(),
                &tool,
            );
            emit(result(level, message));
        }
    }

    fn vscode_extensions(
        &self,
        module: &Module,
        dry_run: bool,
        emit: &mut dyn FnMut(DeployResult),
    ) {
        if module.vscode_extensions.is_empty() {
            return;
        }
        let code = find_code_command(&*self.ctx.executor);
        let installed = code.as_deref().map(|cmd| {
            get_installed_extensions(cmd, &*self.ctx.executor).unwrap_or_else(|e| {
                tracing::warn!("listing VS Code extensions failed: {e:#}");
                HashSet::new()
            })
        });
        let installed = Arc::new(installed.unwrap_or_default());

        for id in &module.vscode_extensions {
            if self.cancelled() {
                return;
            }
            let result = |level, message: String| {
                DeployResult::action(&module.display_name, "", id.clone(), level, message)
            };
            let Some(code) = &code else {
                emit(tool_missing("VS Code CLI", id, result));
                continue;
            };
            let resource = VsCodeExtensionResource::new(
                id.clone(),
                code.clone(),
                Arc::clone(&installed),
                Arc::clone(&self.ctx.executor),
            );
            let (level, message) =
                install_outcome(&resource, dry_run, id, &resource.command_line(), code);
            emit(result(level, message));
        }
    }

    fn ps_modules(&self, module: &Module, dry_run: bool, emit: &mut dyn FnMut(DeployResult)) {
        if module.ps_modules.is_empty() {
            return;
        }
        let available = self.ctx.executor.which("pwsh");
        for name in &module.ps_modules {
            if self.cancelled() {
                return;
            }
            let result = |level, message: String| {
                DeployResult::action(&module.display_name, "", name.clone(), level, message)
            };
            if !available {
                emit(tool_missing("pwsh", name, result));
                continue;
            }
            let resource = PsModuleResource::new(name.clone(), Arc::clone(&self.ctx.executor));
            let (level, message) =
                install_outcome(&resource, dry_run, name, &resource.command_line(), "pwsh");
            emit(result(level, message));
        }
    }
}

fn tool_missing(
    tool: &str,
    item: &str,
    result: impl Fn(ResultLevel, String) -> DeployResult,
) -> DeployResult {
    result(
        ResultLevel::Warning,
        format!("{tool} not found; skipped {item}"),
    )
}

/// Shared message shape of the package-style steps. A dry run checks the
/// installed state; a real run lets `apply` check it.
fn install_outcome(
    resource: &dyn Resource,
    dry_run: bool,
    item: &str,
    command: &str,
    via: &str,
) -> (ResultLevel, String) {
    let already = || (ResultLevel::Synced, format!("{item} already installed"));
    if dry_run {
        return match resource.current_state() {
            Ok(ResourceState::Correct) => already(),
            Ok(_) => (ResultLevel::Ok, format!("Would run: {command}")),
            Err(e) => (ResultLevel::Error, format!("{e:#}")),
        };
    }
    match resource.apply() {
        Ok(ResourceChange::Applied) => (ResultLevel::Ok, format!("Installed {item} via {via}")),
        Ok(ResourceChange::AlreadyCorrect) => already(),
        Ok(ResourceChange::Failed { message }) => (ResultLevel::Error, message),
        Err(e) => (ResultLevel::Error, format!("{e:#}")),
    }
}
