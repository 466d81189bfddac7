//! Link reconciliation: classify one (source, target) pair and converge it.
use std::path::Path;
use std::sync::Arc;

use super::result::{DeployResult, ResultLevel};
use crate::config::LinkKind;
use crate::resources::link::{LinkProvider, LinkResource, LinkState};
use crate::resources::{Applicable as _, ResourceChange};

/// Message for a target that exists and is not a link.
pub const CONFLICT_MESSAGE: &str = "Target exists and is not a link; resolve manually";

/// Converges links through a [`LinkProvider`].
#[derive(Debug, Clone)]
pub struct LinkReconciler {
    provider: Arc<dyn LinkProvider>,
    case_insensitive: bool,
}

impl LinkReconciler {
    /// Create a reconciler. `case_insensitive` controls destination
    /// comparison (Windows and macOS).
    #[must_use]
    pub fn new(provider: Arc<dyn LinkProvider>, case_insensitive: bool) -> Self {
        Self {
            provider,
            case_insensitive,
        }
    }

    fn resource(&self, source: &Path, target: &Path, kind: LinkKind) -> LinkResource {
        LinkResource::new(
            source.to_path_buf(),
            target.to_path_buf(),
            kind,
            self.case_insensitive,
            Arc::clone(&self.provider),
        )
    }

    /// Read-only relationship between `target` and `source`.
    #[must_use]
    pub fn classify(&self, source: &Path, target: &Path) -> LinkState {
        self.resource(source, target, LinkKind::Symlink).classify()
    }

    /// Bring `target` to a link to `source`, or on a dry run report what
    /// would happen. Conflicts are never overwritten.
    #[must_use]
    pub fn converge(
        &self,
        module: &str,
        source: &Path,
        target: &Path,
        kind: LinkKind,
        dry_run: bool,
    ) -> DeployResult {
        let result = |level, message: String| {
            DeployResult::action(
                module,
                source.display().to_string(),
                target.display().to_string(),
                level,
                message,
            )
        };

        let resource = self.resource(source, target, kind);
        let (applied_message, planned_message) = match resource.classify() {
            LinkState::Linked => {
                return result(ResultLevel::Synced, "Already linked".to_string());
            }
            LinkState::Conflict => return result(ResultLevel::Error, CONFLICT_MESSAGE.to_string()),
            LinkState::Error { message } => return result(ResultLevel::Error, message),
            LinkState::Missing => ("Linked".to_string(), "Would link".to_string()),
            LinkState::Drift { current } => (
                format!("Relinked (was {})", current.display()),
                format!("Would relink (was {})", current.display()),
            ),
        };

        if dry_run {
            return result(ResultLevel::Ok, planned_message);
        }

        match resource.apply() {
            Ok(ResourceChange::Applied) => {
                tracing::debug!("{}", resource.description());
                result(ResultLevel::Ok, applied_message)
            }
            Ok(ResourceChange::AlreadyCorrect) => {
                result(ResultLevel::Synced, "Already linked".to_string())
            }
            Ok(ResourceChange::Failed { message }) => result(ResultLevel::Error, message),
            Err(e) => result(ResultLevel::Error, format!("{e:#}")),
        }
    }
}

/// Status-command rendering of a [`LinkState`].
#[must_use]
pub fn status_of(state: &LinkState) -> (ResultLevel, String) {
    match state {
        LinkState::Linked => (ResultLevel::Ok, "OK".to_string()),
        LinkState::Missing => (ResultLevel::Warning, "Target does not exist".to_string()),
        LinkState::Drift { current } => (
            ResultLevel::Warning,
            format!("Link points to {}", current.display()),
        ),
        LinkState::Conflict => (
            ResultLevel::Error,
            "Target exists and is not a link".to_string(),
        ),
        LinkState::Error { message } => (ResultLevel::Error, message.clone()),
    }
}
