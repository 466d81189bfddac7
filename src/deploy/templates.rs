//! Template links: render the source into the repo's generated directory,
//! then link the generated file instead of the raw source.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::links::LinkReconciler;
use super::result::{DeployResult, ResultLevel};
use crate::config::{LinkKind, Module};
use crate::error::TemplateError;
use crate::template::TemplateResolver;

/// Converges template links for one run.
#[derive(Debug, Clone)]
pub struct TemplateLinker {
    reconciler: LinkReconciler,
    templates: TemplateResolver,
    repo: PathBuf,
}

impl TemplateLinker {
    /// Create a linker writing generated files under `repo`.
    #[must_use]
    pub fn new(reconciler: LinkReconciler, templates: TemplateResolver, repo: &Path) -> Self {
        Self {
            reconciler,
            templates,
            repo: repo.to_path_buf(),
        }
    }

    /// Render `source` and link the result at `target`.
    ///
    /// A failed reference fails the whole template; nothing is written and no
    /// link is attempted. Dry runs only count placeholders.
    #[must_use]
    pub fn converge(
        &self,
        module: &Module,
        source: &Path,
        target: &Path,
        kind: LinkKind,
        variables: &HashMap<String, String>,
        dry_run: bool,
    ) -> DeployResult {
        let error = |e: &TemplateError| {
            DeployResult::action(
                &module.display_name,
                source.display().to_string(),
                target.display().to_string(),
                ResultLevel::Error,
                e.to_string(),
            )
        };

        if dry_run {
            return match TemplateResolver::plan(source) {
                Ok(plan) => DeployResult::action(
                    &module.display_name,
                    source.display().to_string(),
                    target.display().to_string(),
                    ResultLevel::Ok,
                    format!(
                        "Would resolve {} reference(s) and {} variable(s), generate to {}",
                        plan.references,
                        plan.variables,
                        TemplateResolver::generated_path(&self.repo, &module.name, source)
                            .display()
                    ),
                ),
                Err(e) => error(&e),
            };
        }

        let generated = match self
            .templates
            .generate(source, &self.repo, &module.name, variables)
        {
            Ok(generated) => generated,
            Err(e) => return error(&e),
        };

        let mut result = self.reconciler.converge(
            &module.display_name,
            &generated.path,
            target,
            kind,
            false,
        );
        if !generated.warnings.is_empty() && result.level != ResultLevel::Error {
            result.level = ResultLevel::Warning;
            result.message = format!(
                "{}; unresolved: {}",
                result.message,
                generated.warnings.join(", ")
            );
        }
        result
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::resources::link::SystemLinkProvider;
    use crate::template::resolvers::{MockReferenceResolver, MockVariableResolver};
    use std::sync::Arc;

    struct Fixture {
        dir: tempfile::TempDir,
        module: Module,
        source: PathBuf,
        target: PathBuf,
    }

    fn fixture(content: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let module_dir = dir.path().join("repo").join("git");
        std::fs::create_dir_all(&module_dir).unwrap();
        let source = module_dir.join(".gitconfig");
        std::fs::write(&source, content).unwrap();
        let module = Module::parse("git", &module_dir, "display_name = \"Git\"").unwrap();
        let target = dir.path().join("home").join(".gitconfig");
        Fixture {
            dir,
            module,
            source,
            target,
        }
    }

    fn linker(repo: &Path, refs: MockReferenceResolver) -> TemplateLinker {
        let mut vars = MockVariableResolver::new();
        vars.expect_resolve().returning(|name, _| {
            (name == "user").then(|| "ada".to_string())
        });
        TemplateLinker::new(
            LinkReconciler::new(Arc::new(SystemLinkProvider), false),
            TemplateResolver::new(Arc::new(refs), Arc::new(vars)),
            repo,
        )
    }

    #[test]
    fn dry_run_counts_without_resolving() {
        let f = fixture("{{op://v/i/f}} {{user}} {{user}} {{email}}");
        let repo = f.dir.path().join("repo");
        let result = linker(&repo, MockReferenceResolver::new()).converge(
            &f.module,
            &f.source,
            &f.target,
            LinkKind::Symlink,
            &HashMap::new(),
            true,
        );
        assert_eq!(result.level, ResultLevel::Ok);
        assert_eq!(result.module, "Git");
        assert_eq!(
            result.message,
            format!(
                "Would resolve 1 reference(s) and 2 variable(s), generate to {}",
                repo.join(".generated").join("git").join(".gitconfig").display()
            )
        );
        assert!(!repo.join(".generated").exists());
    }

    #[test]
    fn missing_source_is_error() {
        let f = fixture("");
        std::fs::remove_file(&f.source).unwrap();
        let repo = f.dir.path().join("repo");
        for dry_run in [true, false] {
            let result = linker(&repo, MockReferenceResolver::new()).converge(
                &f.module,
                &f.source,
                &f.target,
                LinkKind::Symlink,
                &HashMap::new(),
                dry_run,
            );
            assert_eq!(result.level, ResultLevel::Error);
            assert_eq!(result.message, "Template source file not found");
        }
    }

    #[test]
    fn failed_reference_generates_and_links_nothing() {
        let f = fixture("token = {{op://v/i/f}}");
        let repo = f.dir.path().join("repo");
        let mut refs = MockReferenceResolver::new();
        refs.expect_resolve()
            .returning(|_| Err(anyhow::anyhow!("not signed in")));
        let result = linker(&repo, refs).converge(
            &f.module,
            &f.source,
            &f.target,
            LinkKind::Symlink,
            &HashMap::new(),
            false,
        );
        assert_eq!(result.level, ResultLevel::Error);
        assert_eq!(
            result.message,
            "Failed to resolve: op://v/i/f: not signed in"
        );
        assert!(!repo.join(".generated").exists());
        assert!(std::fs::symlink_metadata(&f.target).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn unknown_variables_downgrade_to_warning() {
        let f = fixture("name = {{user}}\nemail = {{email}}");
        let repo = f.dir.path().join("repo");
        let result = linker(&repo, MockReferenceResolver::new()).converge(
            &f.module,
            &f.source,
            &f.target,
            LinkKind::Symlink,
            &HashMap::new(),
            false,
        );
        assert_eq!(result.level, ResultLevel::Warning);
        assert_eq!(
            result.message,
            "Linked; unresolved: {{email}}: unknown variable"
        );
        assert_eq!(
            std::fs::read_to_string(&f.target).unwrap(),
            "name = ada\nemail = {{email}}"
        );
    }
}
