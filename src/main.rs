//! `perch` binary entry point.
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

use perch_cli::cli::{Cli, Command, DiffCommand, GitCommand};
use perch_cli::commands;
use perch_cli::deploy::CancellationToken;
use perch_cli::diff::DiffTracker;
use perch_cli::logging::{self, Logger};

fn main() -> ExitCode {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = Cli::parse();
    let name = command_name(&args.command);
    logging::init_subscriber(args.verbose, name);
    let log = Arc::new(Logger::new(name));

    let cancel = CancellationToken::new();
    if let Err(e) = cancel.install_ctrlc_handler() {
        log.warn(&format!("cannot install Ctrl-C handler: {e:#}"));
    }

    let result = match &args.command {
        Command::Deploy(opts) => commands::deploy::run(&args.global, opts, &log, cancel),
        Command::Status(opts) => commands::status::run(&args.global, opts, &log, cancel),
        Command::Snapshots => commands::snapshot_provider()
            .and_then(|provider| commands::snapshots::run(&provider, log.as_ref())),
        Command::Restore(opts) => commands::snapshot_provider().and_then(|provider| {
            commands::restore::run(&provider, opts, log.as_ref(), &cancel)
        }),
        Command::Git(GitCommand::Setup) => commands::git_setup::run(&args.global, &log, cancel),
        Command::Diff(DiffCommand::Start(opts)) => {
            let tracker = DiffTracker::new(DiffTracker::default_path());
            commands::diff::start(&tracker, &opts.path, log.as_ref(), &cancel)
        }
        Command::Diff(DiffCommand::Stop) => {
            let tracker = DiffTracker::new(DiffTracker::default_path());
            commands::diff::stop(&tracker, log.as_ref(), &cancel)
        }
        Command::Completions(opts) => {
            commands::completions::run(opts.shell, &mut std::io::stdout().lock())
        }
        Command::Version => commands::version::run(&mut std::io::stdout().lock()),
    };

    match result {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            log.error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

/// Log file stem for each subcommand.
const fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Deploy(_) => "deploy",
        Command::Status(_) => "status",
        Command::Snapshots => "snapshots",
        Command::Restore(_) => "restore",
        Command::Git(_) => "git-setup",
        Command::Diff(_) => "diff",
        Command::Completions(_) => "completions",
        Command::Version => "version",
    }
}
