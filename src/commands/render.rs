//! Rendering of the deploy result stream through [`Log`].
use std::sync::{Arc, Mutex};

use crate::deploy::{DeployEventType, DeployResult, Progress, ResultLevel};
use crate::logging::{Log, ModuleStatus};

/// [`Progress`] sink that prints results as log lines and records module
/// outcomes for the end-of-run summary.
#[derive(Debug)]
pub struct LogProgress {
    log: Arc<dyn Log>,
    dry_run: bool,
    current: Mutex<Option<String>>,
}

impl LogProgress {
    /// Render through `log`. Under `dry_run`, planned changes are logged as
    /// dry-run lines and completed modules are recorded as `DryRun`.
    #[must_use]
    pub fn new(log: Arc<dyn Log>, dry_run: bool) -> Self {
        Self {
            log,
            dry_run,
            current: Mutex::new(None),
        }
    }

    /// Print a stage header when `module` differs from the last one rendered.
    fn enter(&self, module: &str) {
        let Ok(mut current) = self.current.lock() else {
            return;
        };
        if current.as_deref() != Some(module) {
            self.log.stage(module);
            *current = Some(module.to_string());
        }
    }

    fn action(&self, result: &DeployResult) {
        self.enter(&result.module);
        let line = action_line(result);
        match result.level {
            ResultLevel::Synced => self.log.debug(&line),
            ResultLevel::Ok if self.dry_run => self.log.dry_run(&line),
            ResultLevel::Ok => self.log.info(&line),
            ResultLevel::Warning => self.log.warn(&line),
            ResultLevel::Error => self.log.error(&line),
        }
    }
}

/// `<target>: <message>`, or just the message when there is no target.
fn action_line(result: &DeployResult) -> String {
    if result.target.is_empty() {
        result.message.clone()
    } else {
        format!("{}: {}", result.target, result.message)
    }
}

/// `disabled` for `Skipped (disabled)`.
fn skip_detail(message: &str) -> &str {
    message
        .strip_prefix("Skipped (")
        .and_then(|m| m.strip_suffix(')'))
        .unwrap_or(message)
}

impl Progress for LogProgress {
    fn report(&self, result: &DeployResult) {
        match result.event {
            DeployEventType::Action => self.action(result),
            DeployEventType::ModuleDiscovered => {
                self.log.debug(&format!("{}: eligible", result.module));
            }
            DeployEventType::ModuleSkipped => {
                self.log
                    .debug(&format!("{}: {}", result.module, result.message));
                self.log.record_module(
                    &result.module,
                    ModuleStatus::Skipped,
                    Some(skip_detail(&result.message)),
                );
            }
            DeployEventType::ModuleStarted => self.enter(&result.module),
            DeployEventType::ModuleCompleted => {
                let status = match (result.level, self.dry_run) {
                    (ResultLevel::Error, _) => ModuleStatus::Failed,
                    (_, true) => ModuleStatus::DryRun,
                    (_, false) => ModuleStatus::Ok,
                };
                self.log.record_module(&result.module, status, None);
            }
        }
    }
}
