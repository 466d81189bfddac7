//! Template rendering: secret references and machine variables substituted
//! into a generated copy of a module file.
pub mod placeholders;
pub mod resolvers;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use resolvers::{
    MachineVariableResolver, OnePasswordResolver, ReferenceResolver, VariableResolver,
};

use crate::error::TemplateError;

/// Directory under the config repo that holds generated files.
pub const GENERATED_DIR: &str = ".generated";

/// Placeholder counts of a template, reported by dry runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplatePlan {
    /// Distinct `op://` references.
    pub references: usize,
    /// Distinct variables.
    pub variables: usize,
}

/// A generated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    /// Where the rendered content was written.
    pub path: PathBuf,
    /// `{{name}}: unknown variable` for every unresolved variable.
    pub warnings: Vec<String>,
}

/// Renders templates with a [`ReferenceResolver`] and a [`VariableResolver`].
#[derive(Debug, Clone)]
pub struct TemplateResolver {
    references: Arc<dyn ReferenceResolver>,
    variables: Arc<dyn VariableResolver>,
}

impl TemplateResolver {
    /// Create a resolver.
    #[must_use]
    pub fn new(
        references: Arc<dyn ReferenceResolver>,
        variables: Arc<dyn VariableResolver>,
    ) -> Self {
        Self {
            references,
            variables,
        }
    }

    /// `<repo>/.generated/<module>/<source file name>`.
    #[must_use]
    pub fn generated_path(repo: &Path, module: &str, source: &Path) -> PathBuf {
        let mut path = repo.join(GENERATED_DIR).join(module);
        if let Some(name) = source.file_name() {
            path.push(name);
        }
        path
    }

    /// Count the placeholders in `source` without resolving anything.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::SourceMissing`] or [`TemplateError::Read`].
    pub fn plan(source: &Path) -> Result<TemplatePlan, TemplateError> {
        let content = read_source(source)?;
        Ok(TemplatePlan {
            references: placeholders::find_references(&content).len(),
            variables: placeholders::find_variables(&content).len(),
        })
    }

    /// Substitute references and variables in `content`.
    ///
    /// Returns the rendered text and one warning per unknown variable.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Unresolved`] listing every failed reference.
    pub fn render(
        &self,
        content: &str,
        variables: &HashMap<String, String>,
    ) -> Result<(String, Vec<String>), TemplateError> {
        let mut values = HashMap::new();
        let mut failures = Vec::new();

        for reference in placeholders::find_references(content) {
            match self.references.resolve(&reference) {
                Ok(value) => {
                    values.insert(reference, value);
                }
                Err(e) => failures.push(TemplateError::Reference {
                    reference,
                    reason: format!("{e:#}"),
                }),
            }
        }
        if !failures.is_empty() {
            return Err(TemplateError::Unresolved(failures));
        }

        let mut warnings = Vec::new();
        for name in placeholders::find_variables(content) {
            match self.variables.resolve(&name, variables) {
                Some(value) => {
                    values.insert(name, value);
                }
                None => warnings.push(format!("{{{{{name}}}}}: unknown variable")),
            }
        }

        Ok((
            placeholders::replace_placeholders(content, &values),
            warnings,
        ))
    }

    /// Render `source` and write it under the repo's generated directory.
    ///
    /// Nothing is written when any reference fails.
    ///
    /// # Errors
    ///
    /// Returns a [`TemplateError`] when the source is missing or unreadable,
    /// a reference fails, or the output cannot be written.
    pub fn generate(
        &self,
        source: &Path,
        repo: &Path,
        module: &str,
        variables: &HashMap<String, String>,
    ) -> Result<Generated, TemplateError> {
        let content = read_source(source)?;
        let (rendered, warnings) = self.render(&content, variables)?;
        let path = Self::generated_path(repo, module, source);

        let write_err = |source| TemplateError::Write {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(&path, rendered).map_err(write_err)?;
        tracing::debug!("generated {}", path.display());

        Ok(Generated { path, warnings })
    }
}

fn read_source(source: &Path) -> Result<String, TemplateError> {
    if !source.is_file() {
        return Err(TemplateError::SourceMissing(source.display().to_string()));
    }
    std::fs::read_to_string(source).map_err(|e| TemplateError::Read {
        path: source.display().to_string(),
        source: e,
    })
}
