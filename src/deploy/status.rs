//! Read-only drift report for every eligible module.
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::links::{LinkReconciler, status_of};
use super::module::{ModuleSteps, ResolvedLink};
use super::orchestrator::{Orchestrator, skip_reason};
use super::progress::{Progress, Reporter};
use super::result::{DeployResult, ResultLevel};
use crate::config::{Module, RegistryEntry};
use crate::platform::Os;
use crate::resources::ResourceState;
use crate::resources::registry::RegistryResource;

/// One row of the report, classified in parallel.
enum Check {
    Link {
        module: String,
        source: PathBuf,
        target: PathBuf,
    },
    Done(DeployResult),
}

impl Orchestrator {
    /// Report the state of every link and registry value of the eligible
    /// modules of `repo` without changing anything.
    ///
    /// Link checks run in parallel but are reported in declaration order.
    /// Returns `1` if any result is not `Ok`, `0` otherwise.
    pub fn check_status(&self, repo: &Path, progress: &dyn Progress) -> i32 {
        let reporter = Reporter::new(progress);
        let ctx = self.context();
        let os = ctx.platform.os();
        let discovered = self.discover(repo, &reporter);
        let steps = ModuleSteps::new(ctx, repo, &discovered.profile.variables);
        let reconciler =
            LinkReconciler::new(
                Arc::clone(&ctx.links),
                ctx.platform.paths_case_insensitive(),
            );

        let mut degraded = false;
        for module in &discovered.modules {
            if ctx.cancel.is_cancelled() {
                break;
            }
            if let Some(reason) = skip_reason(module, os, &discovered.profile) {
                tracing::debug!("{}: {reason}", module.name);
                continue;
            }

            let mut checks = link_checks(&steps, module);
            if os == Os::Windows {
                checks.extend(module.registry.iter().map(|entry| {
                    Check::Done(self.registry_status(&module.display_name, entry))
                }));
            }

            let results: Vec<DeployResult> = checks
                .into_par_iter()
                .map(|check| match check {
                    Check::Done(result) => result,
                    Check::Link {
                        module,
                        source,
                        target,
                    } => {
                        let (level, message) = status_of(&reconciler.classify(&source, &target));
                        DeployResult::action(
                            &module,
                            source.display().to_string(),
                            target.display().to_string(),
                            level,
                            message,
                        )
                    }
                })
                .collect();

            for result in &results {
                degraded |= result.level != ResultLevel::Ok;
                reporter.report(result);
            }
        }

        i32::from(degraded || reporter.failed())
    }

    fn registry_status(&self, module: &str, entry: &RegistryEntry) -> DeployResult {
        let registry = &self.context().registry;
        let current = match registry.get_value(&entry.key, &entry.name) {
            Ok(current) => current,
            Err(e) => {
                return DeployResult::action(
                    module,
                    "",
                    entry.display_path(),
                    ResultLevel::Error,
                    format!("{e:#}"),
                );
            }
        };
        let resource = RegistryResource::new(entry.clone(), Arc::clone(registry));
        let (level, message) = match resource.state_from_current(current.as_deref()) {
            ResourceState::Correct => (ResultLevel::Ok, "OK".to_string()),
            ResourceState::Missing => (
                ResultLevel::Warning,
                format!("Registry value {} does not exist", entry.name),
            ),
            ResourceState::Incorrect { current } => {
                let expected = entry
                    .value
                    .as_ref()
                    .map_or_else(|| "absent".to_string(), ToString::to_string);
                (
                    ResultLevel::Warning,
                    format!("Registry {} is {current}, expected {expected}", entry.name),
                )
            }
            ResourceState::Invalid { reason } => (ResultLevel::Error, reason),
        };
        DeployResult::action(module, "", entry.display_path(), level, message)
    }
}

fn link_checks(steps: &ModuleSteps<'_>, module: &Module) -> Vec<Check> {
    let name = &module.display_name;
    steps
        .resolve_links(module)
        .into_iter()
        .flat_map(|link| match link {
            ResolvedLink::NoTarget { .. } => Vec::new(),
            ResolvedLink::NoMatch { source, expression } => {
                vec![Check::Done(DeployResult::action(
                    name,
                    source.display().to_string(),
                    expression,
                    ResultLevel::Warning,
                    "No matches for glob pattern",
                ))]
            }
            ResolvedLink::Targets {
                source,
                targets,
                template,
                ..
            } => {
                let source = steps.link_source(module, &source, template);
                targets
                    .into_iter()
                    .map(|target| Check::Link {
                        module: name.clone(),
                        source: source.clone(),
                        target,
                    })
                    .collect()
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::catalog::MockPackageCatalog;
    use crate::config::discovery::MockModuleCatalog;
    use crate::config::{DiscoveryResult, MachineProfile, MachineProfileSource};
    use crate::deploy::cancel::CancellationToken;
    use crate::deploy::context::Context;
    use crate::deploy::progress::CollectingProgress;
    use crate::deploy::snapshot::MockSnapshotProvider;
    use crate::error::ConfigError;
    use crate::paths::FsGlobResolver;
    use crate::platform::Platform;
    use crate::resources::link::SystemLinkProvider;
    use crate::resources::package::MockInstalledPackageChecker;
    use crate::resources::path_env::MockPathService;
    use crate::resources::registry::MockRegistryProvider;
    use crate::resources::test_helpers::MockExecutor;
    use crate::template::resolvers::{MockReferenceResolver, MockVariableResolver};

    #[derive(Debug)]
    struct NoProfile;

    impl MachineProfileSource for NoProfile {
        fn load(&self, _: &Path) -> Result<Option<MachineProfile>, ConfigError> {
            Ok(None)
        }
    }

    fn orchestrator(os: Os, modules: Vec<Module>, registry: MockRegistryProvider) -> Orchestrator {
        let mut catalog = MockModuleCatalog::new();
        let discovery = DiscoveryResult {
            modules,
            errors: Vec::new(),
        };
        catalog
            .expect_discover()
            .returning(move |_| discovery.clone());
        Orchestrator::new(Context {
            platform: Arc::new(Platform::new(os)),
            machine_name: "desk".to_string(),
            executor: Arc::new(MockExecutor::empty()),
            modules: Arc::new(catalog),
            profiles: Arc::new(NoProfile),
            packages: Arc::new(MockPackageCatalog::new()),
            globs: Arc::new(FsGlobResolver),
            links: Arc::new(SystemLinkProvider),
            registry: Arc::new(registry),
            path_service: Arc::new(MockPathService::new()),
            installed: Arc::new(MockInstalledPackageChecker::new()),
            references: Arc::new(MockReferenceResolver::new()),
            variables: Arc::new(MockVariableResolver::new()),
            snapshots: Arc::new(MockSnapshotProvider::new()),
            cancel: CancellationToken::new(),
        })
    }

    fn module(dir: &Path, name: &str, manifest: &str) -> Module {
        let path = dir.join("repo").join(name);
        std::fs::create_dir_all(&path).unwrap();
        Module::parse(name, &path, manifest).unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn reports_links_in_declaration_order() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home");
        std::fs::create_dir_all(&home).unwrap();
        let manifest: String = ["a", "b", "c", "d"]
            .iter()
            .map(|n| {
                format!(
                    "[[links]]\nsource = \"{n}\"\ntarget = \"{}\"\n",
                    home.join(n).display()
                )
            })
            .collect();
        let git = module(dir.path(), "git", &manifest);
        std::os::unix::fs::symlink(git.path.join("a"), home.join("a")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("elsewhere"), home.join("b")).unwrap();
        std::fs::write(home.join("d"), "real file").unwrap();

        let progress = CollectingProgress::new();
        let code = orchestrator(Os::Linux, vec![git], MockRegistryProvider::new())
            .check_status(&dir.path().join("repo"), &progress);
        assert_eq!(code, 1);
        let rows: Vec<_> = progress
            .results()
            .into_iter()
            .map(|r| (r.level, r.message))
            .collect();
        assert_eq!(
            rows,
            vec![
                (ResultLevel::Ok, "OK".to_string()),
                (
                    ResultLevel::Warning,
                    format!("Link points to {}", dir.path().join("elsewhere").display())
                ),
                (ResultLevel::Warning, "Target does not exist".to_string()),
                (
                    ResultLevel::Error,
                    "Target exists and is not a link".to_string(),
                ),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn all_linked_is_zero_and_ineligible_modules_are_silent() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home");
        std::fs::create_dir_all(&home).unwrap();
        let manifest = format!(
            "[[links]]\nsource = \"cfg\"\ntarget = \"{}\"\n",
            home.join("cfg").display()
        );
        let git = module(dir.path(), "git", &manifest);
        let off = module(dir.path(), "off", &format!("enabled = false\n{manifest}"));
        std::os::unix::fs::symlink(git.path.join("cfg"), home.join("cfg")).unwrap();

        let progress = CollectingProgress::new();
        let code = orchestrator(Os::Linux, vec![git, off], MockRegistryProvider::new())
            .check_status(&dir.path().join("repo"), &progress);
        assert_eq!(code, 0);
        let results = progress.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].module, "git");
    }

    #[test]
    fn glob_without_matches_is_warning() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = format!(
            "[[links]]\nsource = \"settings.json\"\ntarget = \"{}\"\n",
            dir.path().join("nowhere").join("*").join("settings.json").display()
        );
        let code_module = module(dir.path(), "code", &manifest);
        let progress = CollectingProgress::new();
        let code = orchestrator(Os::Linux, vec![code_module], MockRegistryProvider::new())
            .check_status(&dir.path().join("repo"), &progress);
        assert_eq!(code, 1);
        let results = progress.results();
        assert_eq!(results[0].level, ResultLevel::Warning);
        assert_eq!(results[0].message, "No matches for glob pattern");
    }

    #[test]
    fn registry_rows_on_windows() {
        let dir = tempfile::tempdir().unwrap();
        let shell = module(
            dir.path(),
            "shell",
            "[[registry]]\nkey = 'HKCU\\Console'\nname = 'QuickEdit'\nvalue = 1\n\n\
             [[registry]]\nkey = 'HKCU\\Console'\nname = 'FontSize'\nvalue = 14\n\n\
             [[registry]]\nkey = 'HKCU\\Console'\nname = 'Legacy'\nvalue = 0\n",
        );
        let mut registry = MockRegistryProvider::new();
        registry
            .expect_get_value()
            .returning(|_, name| match name {
                "QuickEdit" => Ok(Some("1".to_string())),
                "FontSize" => Ok(Some("12".to_string())),
                _ => Ok(None),
            });
        let progress = CollectingProgress::new();
        let code = orchestrator(Os::Windows, vec![shell], registry)
            .check_status(&dir.path().join("repo"), &progress);
        assert_eq!(code, 1);
        let messages: Vec<_> = progress.results().into_iter().map(|r| r.message).collect();
        assert_eq!(
            messages,
            vec![
                "OK",
                "Registry FontSize is 12, expected 14",
                "Registry value Legacy does not exist",
            ]
        );
    }

    #[test]
    fn registry_is_not_checked_off_windows() {
        let dir = tempfile::tempdir().unwrap();
        let shell = module(
            dir.path(),
            "shell",
            "[[registry]]\nkey = 'HKCU\\Console'\nname = 'QuickEdit'\nvalue = 1\n",
        );
        let progress = CollectingProgress::new();
        let code = orchestrator(Os::Linux, vec![shell], MockRegistryProvider::new())
            .check_status(&dir.path().join("repo"), &progress);
        assert_eq!(code, 0);
        assert!(progress.results().is_empty());
    }
}
