// Shared helpers for integration tests.
//
// Provides a temporary config repository plus home directory, a fluent
// builder for module manifests and machine profiles, and in-process fakes
// for the collaborators that would otherwise spawn tools or read the
// machine's package managers.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use perch_cli::config::{TomlMachineProfileSource, TomlModuleCatalog, TomlPackageCatalog};
use perch_cli::deploy::{
    CancellationToken, Confirmer, Context, DeployResult, FsSnapshotProvider, ModuleAction,
    Orchestrator,
};
use perch_cli::exec::{ExecResult, Executor};
use perch_cli::paths::FsGlobResolver;
use perch_cli::platform::{Os, Platform};
use perch_cli::resources::link::SystemLinkProvider;
use perch_cli::resources::package::{InstalledPackageChecker, InstalledSet};
use perch_cli::resources::path_env::NoOpPathService;
use perch_cli::resources::registry::UnsupportedRegistryProvider;
use perch_cli::template::{MachineVariableResolver, ReferenceResolver};

/// Machine name every test context deploys as.
pub const MACHINE: &str = "desk";

/// Executor that records every command and succeeds with empty output.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<String>>,
    tools_present: bool,
}

impl RecordingExecutor {
    /// Executor whose `which` reports every tool as present.
    pub fn with_tools() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            tools_present: true,
        }
    }

    /// Commands run so far, rendered as `program args…`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(perch_cli::exec::display_command(program, args));
        Ok(ExecResult {
            stdout: String::new(),
            stderr: String::new(),
            success: true,
            code: Some(0),
        })
    }
}

impl Executor for RecordingExecutor {
    fn run(&self, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
        self.record(program, args)
    }

    fn run_in(&self, _: &Path, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
        self.record(program, args)
    }

    fn run_unchecked(&self, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
        self.record(program, args)
    }

    fn run_unchecked_in(
        &self,
        _: &Path,
        program: &str,
        args: &[&str],
    ) -> anyhow::Result<ExecResult> {
        self.record(program, args)
    }

    fn which(&self, _: &str) -> bool {
        self.tools_present
    }
}

/// Installed-package checker answering from a fixed list.
#[derive(Debug, Default)]
pub struct FixedInstalled(pub Vec<String>);

impl InstalledPackageChecker for FixedInstalled {
    fn installed_packages(&self) -> InstalledSet {
        self.0.iter().collect()
    }
}

/// Reference resolver answering from a map; unknown references fail.
#[derive(Debug, Default)]
pub struct MapReferences(pub HashMap<String, String>);

impl ReferenceResolver for MapReferences {
    fn resolve(&self, reference: &str) -> anyhow::Result<String> {
        self.0
            .get(reference)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("not signed in"))
    }
}

/// Confirmer answering from a script; unnamed units proceed.
#[derive(Debug, Default)]
pub struct ScriptedConfirmer {
    answers: HashMap<String, ModuleAction>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedConfirmer {
    /// Answer `action` when asked about `name`.
    pub fn answer(mut self, name: &str, action: ModuleAction) -> Self {
        self.answers.insert(name.to_string(), action);
        self
    }

    /// Names asked about so far, in order.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().expect("asked lock").clone()
    }

    fn decide(&self, name: &str) -> ModuleAction {
        self.asked.lock().expect("asked lock").push(name.to_string());
        self.answers
            .get(name)
            .copied()
            .unwrap_or(ModuleAction::Proceed)
    }
}

impl Confirmer for ScriptedConfirmer {
    fn before_module(&self, name: &str, _preview: &[DeployResult]) -> ModuleAction {
        self.decide(name)
    }

    fn before_section(&self, name: &str, _preview: &[DeployResult]) -> ModuleAction {
        self.decide(name)
    }
}

/// An isolated config repository and home directory backed by a
/// [`tempfile::TempDir`].
///
/// Layout: `<tmp>/repo` (config repo), `<tmp>/home` (link targets, exposed to
/// manifests as `${home}`), `<tmp>/backups` (snapshot root).
pub struct IntegrationTestContext {
    /// Temporary directory holding everything.
    pub root: tempfile::TempDir,
    /// Platform the orchestrator is told it runs on.
    pub os: Os,
    /// Packages the fake checker reports as installed.
    pub installed: Vec<String>,
    /// Answers for `op://` references.
    pub references: HashMap<String, String>,
    /// Executor shared with the orchestrator.
    pub executor: Arc<RecordingExecutor>,
}

impl IntegrationTestContext {
    /// Path to the config repository.
    pub fn repo(&self) -> PathBuf {
        self.root.path().join("repo")
    }

    /// Path to the fake home directory.
    pub fn home(&self) -> PathBuf {
        self.root.path().join("home")
    }

    /// Path to the snapshot root.
    pub fn backups(&self) -> PathBuf {
        self.root.path().join("backups")
    }

    /// Snapshot provider over [`Self::backups`].
    pub fn snapshots(&self) -> FsSnapshotProvider {
        FsSnapshotProvider::new(self.backups(), Arc::new(SystemLinkProvider))
    }

    /// Orchestrator wired to real file-backed collaborators and the fakes.
    pub fn orchestrator(&self) -> Orchestrator {
        let repo = self.repo();
        let executor: Arc<dyn Executor> = Arc::clone(&self.executor) as Arc<dyn Executor>;
        Orchestrator::new(Context {
            platform: Arc::new(Platform::new(self.os)),
            machine_name: MACHINE.to_string(),
            executor,
            modules: Arc::new(TomlModuleCatalog),
            profiles: Arc::new(TomlMachineProfileSource::new(MACHINE)),
            packages: Arc::new(TomlPackageCatalog::in_repo(&repo)),
            globs: Arc::new(FsGlobResolver),
            links: Arc::new(SystemLinkProvider),
            registry: Arc::new(UnsupportedRegistryProvider),
            path_service: Arc::new(NoOpPathService),
            installed: Arc::new(FixedInstalled(self.installed.clone())),
            references: Arc::new(MapReferences(self.references.clone())),
            variables: Arc::new(MachineVariableResolver::new(MACHINE, self.os)),
            snapshots: Arc::new(self.snapshots()),
            cancel: CancellationToken::new(),
        })
    }
}

/// Fluent builder for [`IntegrationTestContext`].
pub struct TestContextBuilder {
    ctx: IntegrationTestContext,
    profile: String,
}

impl TestContextBuilder {
    /// Begin building a Linux context with an empty repository.
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir_all(root.path().join("repo")).expect("create repo dir");
        std::fs::create_dir_all(root.path().join("home")).expect("create home dir");
        Self {
            ctx: IntegrationTestContext {
                root,
                os: Os::Linux,
                installed: Vec::new(),
                references: HashMap::new(),
                executor: Arc::new(RecordingExecutor::default()),
            },
            profile: String::new(),
        }
    }

    /// Pretend to run on `os`.
    pub const fn os(mut self, os: Os) -> Self {
        self.ctx.os = os;
        self
    }

    /// Write `<repo>/<name>/module.toml`.
    pub fn with_module(self, name: &str, manifest: &str) -> Self {
        self.with_repo_file(&format!("{name}/module.toml"), manifest)
    }

    /// Write `content` to `<repo>/<relative>`, creating parents.
    pub fn with_repo_file(self, relative: &str, content: &str) -> Self {
        let path = self.ctx.repo().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        std::fs::write(&path, content).expect("write repo file");
        self
    }

    /// Append top-level keys to `machines/base.toml`.
    pub fn with_profile(mut self, toml: &str) -> Self {
        self.profile.push_str(toml);
        self.profile.push('\n');
        self
    }

    /// Report `id` as installed.
    pub fn installed(mut self, id: &str) -> Self {
        self.ctx.installed.push(id.to_string());
        self
    }

    /// Resolve `reference` to `value`.
    pub fn with_reference(mut self, reference: &str, value: &str) -> Self {
        self.ctx
            .references
            .insert(reference.to_string(), value.to_string());
        self
    }

    /// Finish building: writes `machines/base.toml` with the `home` variable.
    pub fn build(self) -> IntegrationTestContext {
        let home = self.ctx.home();
        let base = format!(
            "{}\n[variables]\nhome = '{}'\n",
            self.profile,
            home.display()
        );
        self.with_repo_file("machines/base.toml", &base).ctx
    }
}

/// `<event> <level> <module>: <message>` per result, for stream snapshots.
pub fn stream(results: &[DeployResult]) -> String {
    results
        .iter()
        .map(|r| {
            format!("{:?} {:?} {}: {}", r.event, r.level, r.module, r.message)
                .trim_end()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
