//! Sinks for the deploy event stream.
use std::cell::Cell;
use std::sync::Mutex;

use super::result::DeployResult;

/// Receives every [`DeployResult`] in emission order.
#[cfg_attr(test, mockall::automock)]
pub trait Progress: Send + Sync + std::fmt::Debug {
    /// Handle one event.
    fn report(&self, result: &DeployResult);
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingProgress {
    results: Mutex<Vec<DeployResult>>,
}

impl CollectingProgress {
    /// An empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far.
    #[must_use]
    pub fn results(&self) -> Vec<DeployResult> {
        self.results.lock().map_or_else(|_| vec![], |g| g.clone())
    }
}

impl Progress for CollectingProgress {
    fn report(&self, result: &DeployResult) {
        if let Ok(mut guard) = self.results.lock() {
            guard.push(result.clone());
        }
    }
}

/// Forwards to a [`Progress`] and remembers whether an error went through.
pub(crate) struct Reporter<'a> {
    progress: &'a dyn Progress,
    failed: Cell<bool>,
}

impl<'a> Reporter<'a> {
    pub(crate) const fn new(progress: &'a dyn Progress) -> Self {
        Self {
            progress,
            failed: Cell::new(false),
        }
    }

    pub(crate) fn report(&self, result: &DeployResult) {
        if result.is_error() {
            self.failed.set(true);
        }
        self.progress.report(result);
    }

    pub(crate) fn failed(&self) -> bool {
        self.failed.get()
    }

    pub(crate) fn exit_code(&self) -> i32 {
        i32::from(self.failed())
    }
}

impl std::fmt::Debug for Reporter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("progress", &self.progress)
            .field("failed", &self.failed.get())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::deploy::result::ResultLevel;

    #[test]
    fn collector_keeps_order() {
        let progress = CollectingProgress::new();
        progress.report(&DeployResult::action("a", "", "", ResultLevel::Ok, "1"));
        progress.report(&DeployResult::action("b", "", "", ResultLevel::Ok, "2"));
        let modules: Vec<_> = progress.results().into_iter().map(|r| r.module).collect();
        assert_eq!(modules, vec!["a", "b"]);
    }

    #[test]
    fn reporter_tracks_errors() {
        let progress = CollectingProgress::new();
        let reporter = Reporter::new(&progress);
        reporter.report(&DeployResult::action("a", "", "", ResultLevel::Warning, "w"));
        assert_eq!(reporter.exit_code(), 0);
        reporter.report(&DeployResult::action("a", "", "", ResultLevel::Error, "e"));
        assert_eq!(reporter.exit_code(), 1);
        assert_eq!(progress.results().len(), 2);
    }
}
