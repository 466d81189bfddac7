//! Module hook script resource.
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{Applicable, ResourceChange};
use crate::exec::Executor;

/// A pre- or post-deploy script run from the module directory.
#[derive(Debug, Clone)]
pub struct HookResource {
    /// Absolute script path.
    pub script: PathBuf,
    /// Working directory (the module directory).
    pub module_dir: PathBuf,
    executor: Arc<dyn Executor>,
}

impl HookResource {
    /// Create a hook for `script` relative to `module_dir`.
    #[must_use]
    pub fn new(module_dir: &Path, script: &str, executor: Arc<dyn Executor>) -> Self {
        Self {
            script: module_dir.join(script),
            module_dir: module_dir.to_path_buf(),
            executor,
        }
    }
}

/// Interpreter and arguments for a hook script, chosen by extension.
#[must_use]
pub fn hook_command(script: &Path) -> (String, Vec<String>) {
    let path = script.display().to_string();
    let ext = script
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match ext.as_deref() {
        Some("ps1") => (
            "pwsh".to_string(),
            vec![
                "-NoProfile".to_string(),
                "-ExecutionPolicy".to_string(),
                "Bypass".to_string(),
                "-File".to_string(),
                path,
            ],
        ),
        Some("sh") => ("bash".to_string(), vec![path]),
        _ => (path, Vec::new()),
    }
}

impl Applicable for HookResource {
    fn description(&self) -> String {
        self.script.display().to_string()
    }

    fn apply(&self) -> Result<ResourceChange> {
        if !self.script.is_file() {
            return Ok(ResourceChange::Failed {
                message: format!("Hook script not found: {}", self.script.display()),
            });
        }

        let (program, args) = hook_command(&self.script);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        tracing::debug!(
            "running hook: {}",
            crate::exec::display_command(&program, &args)
        );
        let result = self
            .executor
            .run_unchecked_in(&self.module_dir, &program, &args)?;

        if result.success {
            Ok(ResourceChange::Applied)
        } else {
            Ok(ResourceChange::Failed {
                message: format!(
                    "Hook failed (exit {}): {}",
                    result.exit_code(),
                    result.detail()
                ),
            })
        }
    }
}
