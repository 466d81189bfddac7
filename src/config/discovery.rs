//! Module discovery: scan the config repository for `module.toml` files.
use std::path::Path;

use super::module::Module;
use crate::error::ConfigError;

/// File name of a module manifest.
pub const MODULE_MANIFEST: &str = "module.toml";

/// Outcome of one discovery pass.
///
/// Modules that fail to parse do not abort discovery; their errors are
/// collected next to the modules that parsed.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryResult {
    /// Successfully parsed modules, sorted by directory name.
    pub modules: Vec<Module>,
    /// Per-module errors formatted `[<module>] <error>`.
    pub errors: Vec<String>,
}

/// Source of modules for a deploy or status run.
#[cfg_attr(test, mockall::automock)]
pub trait ModuleCatalog: Send + Sync + std::fmt::Debug {
    /// Discover every module under `repo`.
    fn discover(&self, repo: &Path) -> DiscoveryResult;
}

/// Discovers modules as `<repo>/<dir>/module.toml`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TomlModuleCatalog;

impl ModuleCatalog for TomlModuleCatalog {
    fn discover(&self, repo: &Path) -> DiscoveryResult {
        if !repo.is_dir() {
            return DiscoveryResult {
                modules: Vec::new(),
                errors: vec![ConfigError::MissingRepo(repo.display().to_string()).to_string()],
            };
        }

        let mut dirs: Vec<_> = match std::fs::read_dir(repo) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.is_dir() && p.join(MODULE_MANIFEST).is_file())
                .collect(),
            Err(e) => {
                return DiscoveryResult {
                    modules: Vec::new(),
                    errors: vec![format!("Failed to read {}: {e}", repo.display())],
                };
            }
        };
        dirs.sort();

        let mut result = DiscoveryResult::default();
        for dir in dirs {
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let manifest = dir.join(MODULE_MANIFEST);
            let parsed = std::fs::read_to_string(&manifest)
                .map_err(|e| format!("Failed to read {MODULE_MANIFEST}: {e}"))
                .and_then(|content| Module::parse(&name, &dir, &content));
            match parsed {
                Ok(module) => result.modules.push(module),
                Err(e) => result.errors.push(format!("[{name}] {e}")),
            }
        }

        tracing::debug!(
            "discovered {} module(s), {} error(s)",
            result.modules.len(),
            result.errors.len()
        );
        result
    }
}
