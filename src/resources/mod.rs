//! Idempotent resource primitives (check + apply pattern) and the OS-facing
//! collaborators they are built on.
pub mod clean_filter;
pub mod global_package;
pub mod helpers;
pub mod hook;
pub mod link;
pub mod package;
pub mod path_env;
pub mod ps_module;
pub mod registry;
pub mod vscode_extension;

use anyhow::Result;

/// Minimal interface for resources that can be described and applied.
pub trait Applicable {
    /// Human-readable description of this resource.
    fn description(&self) -> String;

    /// Bring the resource to its desired state.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be applied (process failure,
    /// permissions, I/O).
    fn apply(&self) -> Result<ResourceChange>;
}

/// State of a resource relative to its desired state.
///
/// # Examples
///
/// ```
/// use perch_cli::resources::ResourceState;
///
/// let missing = ResourceState::Missing;
/// let wrong = ResourceState::Incorrect { current: "0".into() };
///
/// assert_ne!(missing, ResourceState::Correct);
/// assert!(matches!(wrong, ResourceState::Incorrect { .. }));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    /// Resource does not exist.
    Missing,
    /// Resource exists and matches the desired state.
    Correct,
    /// Resource exists but differs from the desired state.
    Incorrect {
        /// The current value of the resource.
        current: String,
    },
    /// Resource cannot be applied here.
    Invalid {
        /// Why the resource cannot be applied.
        reason: String,
    },
}

/// Result of applying a resource change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceChange {
    /// Resource was created or updated.
    Applied,
    /// Resource was already correct (no change needed).
    AlreadyCorrect,
    /// The change was attempted and rejected by the underlying tool.
    Failed {
        /// Failure message, e.g. `npm install -g x failed (exit 1): ...`.
        message: String,
    },
}

/// A resource that can determine its own state before applying.
pub trait Resource: Applicable {
    /// Check the current state of the resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be determined.
    fn current_state(&self) -> Result<ResourceState>;

    /// Whether [`Applicable::apply`] would change anything.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Resource::current_state`].
    fn needs_change(&self) -> Result<bool> {
        Ok(matches!(
            self.current_state()?,
            ResourceState::Missing | ResourceState::Incorrect { .. }
        ))
    }
}

/// Shared test helpers for resource unit tests.
#[cfg(test)]
pub mod test_helpers {
    use crate::exec::{ExecResult, Executor};
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;

    /// A queue-based mock executor.
    ///
    /// Responses are `(success, stdout)` pairs consumed in FIFO order. When
    /// the queue is empty every call fails with stdout `"unexpected call"`.
    /// Every invocation is recorded as a display string (`program args…`).
    #[derive(Debug)]
    pub struct MockExecutor {
        responses: Mutex<VecDeque<(bool, String)>>,
        which_result: bool,
        calls: Mutex<Vec<String>>,
    }

    impl MockExecutor {
        /// A mock with a single successful response.
        #[must_use]
        pub fn ok(stdout: &str) -> Self {
            Self::with_responses(vec![(true, stdout.to_string())])
        }

        /// A mock with a single failed response carrying `stdout`.
        #[must_use]
        pub fn fail(stdout: &str) -> Self {
            Self::with_responses(vec![(false, stdout.to_string())])
        }

        /// A mock that fails every call.
        #[must_use]
        pub fn empty() -> Self {
            Self::with_responses(Vec::new())
        }

        /// A mock from an ordered list of `(success, stdout)` pairs.
        #[must_use]
        pub fn with_responses(responses: Vec<(bool, String)>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                which_result: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Set the value returned by every [`Executor::which`] call.
        #[must_use]
        pub fn with_which(mut self, result: bool) -> Self {
            self.which_result = result;
            self
        }

        /// Commands run so far, rendered as `program args…`.
        #[must_use]
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        /// Number of executor calls made so far.
        #[must_use]
        pub fn call_count(&self) -> usize {
            self.calls().len()
        }

        fn next(&self, program: &str, args: &[&str]) -> ExecResult {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(crate::exec::display_command(program, args));
            }
            let (success, stdout) = self.responses.lock().map_or_else(
                |_| (false, "mutex poisoned".to_string()),
                |mut guard| {
                    guard
                        .pop_front()
                        .unwrap_or_else(|| (false, "unexpected call".to_string()))
                },
            );
            ExecResult {
                stdout,
                stderr: String::new(),
                success,
                code: Some(i32::from(!success)),
            }
        }

        fn checked(&self, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
            let result = self.next(program, args);
            if result.success {
                Ok(result)
            } else {
                anyhow::bail!("mock command failed")
            }
        }
    }

    impl Executor for MockExecutor {
        fn run(&self, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
            self.checked(program, args)
        }

        fn run_in(&self, _: &Path, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
            self.checked(program, args)
        }

        fn run_unchecked(&self, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
            Ok(self.next(program, args))
        }

        fn run_unchecked_in(
            &self,
            _: &Path,
            program: &str,
            args: &[&str],
        ) -> anyhow::Result<ExecResult> {
            Ok(self.next(program, args))
        }

        fn which(&self, _: &str) -> bool {
            self.which_result
        }
    }
}
