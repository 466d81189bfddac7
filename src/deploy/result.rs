//! The deploy event record: the only output of the orchestrator.
use serde::Serialize;
use std::fmt;

/// Severity of a [`DeployResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultLevel {
    /// Nothing to do; already in the desired state.
    Synced,
    /// A change was made (or would be made on a dry run).
    Ok,
    /// Completed with something the operator should look at.
    Warning,
    /// The operation failed.
    Error,
}

impl fmt::Display for ResultLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synced => write!(f, "synced"),
            Self::Ok => write!(f, "ok"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// What kind of event a [`DeployResult`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployEventType {
    /// One operation on one item (link, registry value, package, ...).
    Action,
    /// An eligible module was found.
    ModuleDiscovered,
    /// A module began converging.
    ModuleStarted,
    /// A module was not deployed; the message says why.
    ModuleSkipped,
    /// A module finished; the level is its aggregate outcome.
    ModuleCompleted,
}

/// One immutable deploy event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployResult {
    /// Module key, or a section name such as "System Packages".
    pub module: String,
    /// Source of the operation (file, package name, ...). Empty for module events.
    pub source: String,
    /// Target of the operation (path, registry value, ...). Empty for module events.
    pub target: String,
    /// Severity.
    pub level: ResultLevel,
    /// Human-readable outcome.
    pub message: String,
    /// Event kind.
    pub event: DeployEventType,
}

impl DeployResult {
    /// An [`DeployEventType::Action`] result.
    #[must_use]
    pub fn action(
        module: &str,
        source: impl Into<String>,
        target: impl Into<String>,
        level: ResultLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            module: module.to_string(),
            source: source.into(),
            target: target.into(),
            level,
            message: message.into(),
            event: DeployEventType::Action,
        }
    }

    /// A module lifecycle event with empty source and target.
    #[must_use]
    pub fn module_event(
        module: &str,
        event: DeployEventType,
        level: ResultLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            module: module.to_string(),
            source: String::new(),
            target: String::new(),
            level,
            message: message.into(),
            event,
        }
    }

    /// Whether this result is an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.level == ResultLevel::Error
    }
}
