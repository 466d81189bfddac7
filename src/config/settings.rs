//! User settings (`<config dir>/perch/settings.toml`) and config repo
//! resolution.
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::toml_loader;
use crate::error::ConfigError;

/// Environment variable consulted before the settings file.
pub const CONFIG_PATH_ENV: &str = "PERCH_CONFIG_PATH";

/// Persistent user settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Location of the config repository.
    #[serde(default)]
    pub config_repo_path: Option<PathBuf>,
    /// Machine name used for profiles and install overrides.
    #[serde(default)]
    pub machine_name: Option<String>,
    /// Where snapshots are written.
    #[serde(default)]
    pub backup_root: Option<PathBuf>,
}

impl Settings {
    /// Default settings file location.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("perch").join("settings.toml"))
    }

    /// Load settings from the default location; a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file exists but is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load settings from `path`; a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Ok(toml_loader::load_optional(path)?.unwrap_or_default())
    }

    /// Backup root from settings, or the platform default.
    #[must_use]
    pub fn backup_root(&self) -> PathBuf {
        self.backup_root.clone().unwrap_or_else(default_backup_root)
    }
}

/// `<config dir>/perch/backups` (XDG config dir, `%APPDATA%` on Windows).
#[must_use]
pub fn default_backup_root() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("perch")
        .join("backups")
}

/// Pick the config repository: CLI flag, then `PERCH_CONFIG_PATH`, then
/// settings.
///
/// # Errors
///
/// Returns [`ConfigError::NoConfigPath`] when nothing names a repository and
/// [`ConfigError::MissingRepo`] when the chosen directory does not exist.
pub fn resolve_config_repo(
    cli: Option<&Path>,
    settings: &Settings,
) -> Result<PathBuf, ConfigError> {
    let env = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
    resolve_config_repo_from(cli, env, settings)
}

fn resolve_config_repo_from(
    cli: Option<&Path>,
    env: Option<PathBuf>,
    settings: &Settings,
) -> Result<PathBuf, ConfigError> {
    let chosen = cli
        .map(Path::to_path_buf)
        .or_else(|| env.filter(|p| !p.as_os_str().is_empty()))
        .or_else(|| settings.config_repo_path.clone())
        .ok_or(ConfigError::NoConfigPath)?;

    if !chosen.is_dir() {
        return Err(ConfigError::MissingRepo(chosen.display().to_string()));
    }
    Ok(dunce::canonicalize(&chosen).unwrap_or(chosen))
}
