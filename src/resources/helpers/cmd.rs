//! Running CLI tools that ship as `.cmd` wrappers on Windows.
use anyhow::Result;

use crate::error::ResourceError;
use crate::exec::{ExecResult, Executor};

/// Run `program` whatever its exit status. On Windows, `npm`, `bun` and
/// `code` are batch wrappers that need `cmd.exe /C`.
///
/// # Errors
///
/// Returns an error only if the process cannot be spawned.
pub fn run_cli(executor: &dyn Executor, program: &str, args: &[&str]) -> Result<ExecResult> {
    if cfg!(windows) {
        let mut full_args = vec!["/C", program];
        full_args.extend(args);
        executor.run_unchecked("cmd", &full_args)
    } else {
        executor.run_unchecked(program, args)
    }
}

/// Message for a failed install command, `"<cmd args> failed (exit N): <detail>"`.
#[must_use]
pub fn failure_message(program: &str, args: &[&str], result: &ExecResult) -> String {
    ResourceError::Command {
        command: crate::exec::display_command(program, args),
        code: result.exit_code(),
        detail: result.detail().to_string(),
    }
    .to_string()
}
