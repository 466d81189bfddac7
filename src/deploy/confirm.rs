//! Operator confirmation before each module and section.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dialoguer::Select;
use dialoguer::console::Term;

use super::result::{DeployResult, ResultLevel};
use crate::logging::Log;

/// Operator decision for one module or section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleAction {
    /// Deploy it.
    Proceed,
    /// Leave it alone and continue with the next unit.
    Skip,
    /// Stop the whole run. The run exits successfully.
    Abort,
}

/// Asked before every module and section with that unit's dry-run preview.
#[cfg_attr(test, mockall::automock)]
pub trait Confirmer: Send + Sync + std::fmt::Debug {
    /// Decide on module `name`.
    fn before_module(&self, name: &str, preview: &[DeployResult]) -> ModuleAction;

    /// Decide on a section such as "System Packages".
    fn before_section(&self, name: &str, preview: &[DeployResult]) -> ModuleAction;

    /// Whether the next decision needs a preview. Previews of package steps
    /// spawn package managers, so confirmers that never look skip them.
    fn wants_preview(&self) -> bool {
        true
    }
}

/// Never asks; every unit proceeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysProceed;

impl Confirmer for AlwaysProceed {
    fn before_module(&self, _name: &str, _preview: &[DeployResult]) -> ModuleAction {
        ModuleAction::Proceed
    }

    fn before_section(&self, _name: &str, _preview: &[DeployResult]) -> ModuleAction {
        ModuleAction::Proceed
    }

    fn wants_preview(&self) -> bool {
        false
    }
}

const CHOICES: [&str; 4] = ["Yes", "No", "All", "Quit"];

/// Interactive Yes/No/All/Quit prompt on the terminal.
///
/// "All" proceeds with the current unit and every later one without asking
/// again. Escape and prompt failures abort.
#[derive(Debug)]
pub struct PromptConfirmer {
    log: Arc<dyn Log>,
    proceed_all: AtomicBool,
}

impl PromptConfirmer {
    /// Create a prompt that renders previews through `log`.
    #[must_use]
    pub fn new(log: Arc<dyn Log>) -> Self {
        Self {
            log,
            proceed_all: AtomicBool::new(false),
        }
    }

    fn ask(&self, kind: &str, name: &str, preview: &[DeployResult]) -> ModuleAction {
        if self.proceed_all.load(Ordering::Acquire) {
            return ModuleAction::Proceed;
        }

        self.log.stage(&format!("{kind} {name}"));
        if preview.is_empty() {
            self.log.info("  (nothing to do)");
        }
        for result in preview {
            self.log.info(&format!("  {}", preview_line(result)));
        }

        let choice = Select::new()
            .with_prompt(format!("Deploy {name}?"))
            .items(&CHOICES)
            .default(0)
            .interact_on_opt(&Term::stderr());

        match choice {
            Ok(Some(index)) => action_for_choice(index, &self.proceed_all),
            Ok(None) => ModuleAction::Abort,
            Err(e) => {
                self.log.error(&format!("prompt failed: {e}"));
                ModuleAction::Abort
            }
        }
    }
}

fn action_for_choice(index: usize, proceed_all: &AtomicBool) -> ModuleAction {
    match index {
        0 => ModuleAction::Proceed,
        1 => ModuleAction::Skip,
        2 => {
            proceed_all.store(true, Ordering::Release);
            ModuleAction::Proceed
        }
        _ => ModuleAction::Abort,
    }
}

fn preview_line(result: &DeployResult) -> String {
    let marker = match result.level {
        ResultLevel::Synced => "=",
        ResultLevel::Ok => "+",
        ResultLevel::Warning => "!",
        ResultLevel::Error => "x",
    };
    if result.target.is_empty() {
        format!("{marker} {}", result.message)
    } else {
        format!("{marker} {}: {}", result.target, result.message)
    }
}

impl Confirmer for PromptConfirmer {
    fn before_module(&self, name: &str, preview: &[DeployResult]) -> ModuleAction {
        self.ask("Module", name, preview)
    }

    fn before_section(&self, name: &str, preview: &[DeployResult]) -> ModuleAction {
        self.ask("Section", name, preview)
    }

    fn wants_preview(&self) -> bool {
        !self.proceed_all.load(Ordering::Acquire)
    }
}
