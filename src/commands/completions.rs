//! Completions command: print a shell completion script.
use anyhow::Result;
use clap::CommandFactory as _;
use clap_complete::Shell;

use crate::cli::Cli;

/// Write the completion script for `shell` to `out`.
///
/// # Errors
///
/// Never fails; kept fallible to match the other commands.
pub fn run(shell: Shell, out: &mut dyn std::io::Write) -> Result<i32> {
    let mut command = Cli::command();
    clap_complete::generate(shell, &mut command, "perch", out);
    Ok(0)
}
