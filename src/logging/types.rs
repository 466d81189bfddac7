//! Core logging types: module entries, status, and the [`Log`] trait.

/// Per-module outcome recorded for the end-of-run summary.
#[derive(Debug, Clone)]
pub struct ModuleEntry {
    /// Display name of the module or section.
    pub name: String,
    /// Final status of the module.
    pub status: ModuleStatus,
    /// Optional detail (skip reason, error count).
    pub message: Option<String>,
}

/// Status of a processed module or section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    /// Converged without errors.
    Ok,
    /// Not processed (ineligible, or declined by the operator).
    Skipped,
    /// Previewed only; nothing was changed.
    DryRun,
    /// At least one operation failed.
    Failed,
}

/// Abstraction over logging backends.
///
/// Commands log through this trait so the rendering of deploy events can be
/// exercised in tests without a global subscriber.
pub trait Log: Send + Sync + std::fmt::Debug {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (may be suppressed on console).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Log a dry-run action message.
    fn dry_run(&self, msg: &str);
    /// Record a module result for the summary.
    fn record_module(&self, name: &str, status: ModuleStatus, message: Option<&str>);
}
