//! Domain-specific error types for the reconciliation engine.
//!
//! Collaborators and parsers return the typed errors below; command handlers
//! at the CLI boundary convert them to [`anyhow::Error`] with `?`.
//!
//! # Error hierarchy
//!
//! ```text
//! PerchError
//! ├── Config(ConfigError)     : repo layout, module and manifest parsing
//! ├── Template(TemplateError) : reference resolution, generated output
//! ├── Resource(ResourceError) : links, registry, processes
//! └── Platform(PlatformError) : OS-specific operation failures
//! ```

use thiserror::Error;

/// Top-level error type for the engine.
#[derive(Error, Debug)]
pub enum PerchError {
    /// Configuration-related error (repo layout, TOML parsing, I/O).
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Template processing error.
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Resource operation error (link, registry value, external command).
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    /// Platform-specific operation error.
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
}

/// Errors raised while locating or parsing the config repository.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config repository directory does not exist.
    #[error("Config repo path does not exist: {0}")]
    MissingRepo(String),

    /// No config repository was given on the command line, in the
    /// environment, or in the settings file.
    #[error("No config path specified. Use --config-path or set config_repo_path in settings")]
    NoConfigPath,

    /// A TOML file could not be parsed or failed validation.
    #[error("Invalid TOML in {file}: {message}")]
    InvalidSyntax {
        /// File that failed to parse.
        file: String,
        /// Parser or validation message.
        message: String,
    },

    /// An I/O error occurred while reading a config file.
    #[error("IO error reading config file {path}: {source}")]
    Io {
        /// Path to the file that could not be read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors raised while resolving or writing a template.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// A reference placeholder could not be resolved.
    #[error("{reference}: {reason}")]
    Reference {
        /// The `op://` reference that failed.
        reference: String,
        /// Resolver-provided reason.
        reason: String,
    },

    /// One or more references failed; nothing was generated.
    #[error("Failed to resolve: {}", join_failures(.0))]
    Unresolved(Vec<TemplateError>),

    /// The template source file does not exist.
    #[error("Template source file not found")]
    SourceMissing(String),

    /// The template source could not be read.
    #[error("Failed to read template {path}: {source}")]
    Read {
        /// Source path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The generated file could not be written.
    #[error("Failed to write generated file {path}: {source}")]
    Write {
        /// Destination path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

fn join_failures(failures: &[TemplateError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised by resource operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// A link could not be created, replaced, or inspected.
    #[error("Link error: {0}")]
    Link(String),

    /// A registry operation failed.
    #[error("Registry error at {key}\\{name}: {message}")]
    Registry {
        /// Registry key path.
        key: String,
        /// Value name.
        name: String,
        /// Failure description.
        message: String,
    },

    /// An external command exited unsuccessfully.
    #[error("{command} failed (exit {code}): {detail}")]
    Command {
        /// Command line that was run.
        command: String,
        /// Exit code, `-1` when killed by a signal.
        code: i32,
        /// Captured stderr, or stdout when stderr was empty.
        detail: String,
    },
}

/// Errors that arise from platform-specific operations.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// The requested operation is not supported on the current platform.
    #[error("Operation not supported on {platform}")]
    Unsupported {
        /// Name of the platform (e.g., `"linux"`).
        platform: String,
    },
}
