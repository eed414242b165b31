use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use provision_cli::cli::{Cli, Command};
use provision_cli::commands;
use provision_cli::logging::{self, Logger, RunHeader};
use provision_cli::report::RunOutcome;

/// Exit code for errors raised before any step runs.
fn hard_failure() -> ExitCode {
    ExitCode::from(RunOutcome::HardFailure.exit_code())
}

#[allow(clippy::print_stdout)]
fn main() -> ExitCode {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = Cli::parse();

    match &args.command {
        Command::Completions { shell } => {
            generate(*shell, &mut Cli::command(), "provision", &mut io::stdout());
            return ExitCode::SUCCESS;
        }
        Command::Version => {
            println!("provision {} ({})", provision_cli::VERSION, provision_cli::TARGET);
            return ExitCode::SUCCESS;
        }
        _ => {}
    }

    logging::init_subscriber(
        args.verbose,
        &RunHeader {
            command: args.command.name(),
            device: args.command.device(),
            dry_run: args.command.dry_run(),
        },
    );
    let log = Arc::new(Logger::new(args.command.name()));

    let result = match &args.command {
        Command::Apply(opts) => {
            let report = commands::apply::run(&args.global, opts, &log);
            return ExitCode::from(report.outcome.exit_code());
        }
        Command::Plan(opts) => commands::plan::run(&args.global, opts, &log),
        Command::Validate(opts) => commands::validate::run(&args.global, opts, &log),
        Command::Completions { .. } | Command::Version => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log.error(&format!("{e:#}"));
            hard_failure()
        }
    }
}
