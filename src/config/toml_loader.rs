//! TOML configuration file parsing.
use serde::de::DeserializeOwned;
use std::path::Path;

use crate::error::ConfigError;

/// Parse `content` as TOML, labelling failures with `file`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidSyntax`] when the text is not valid TOML or
/// does not match `T`.
pub fn parse_str<T: DeserializeOwned>(content: &str, file: &str) -> Result<T, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::InvalidSyntax {
        file: file.to_string(),
        message: e.message().to_string(),
    })
}

/// Load and deserialize a TOML file.
///
/// Returns `Ok(None)` when the file does not exist so callers can treat
/// optional files (machine profiles, manifests) uniformly.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    load_config(path).map(Some)
}

/// Load and deserialize a TOML file that must exist.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_str(&content, &path.display().to_string())
}
