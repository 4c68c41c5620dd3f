use anyhow::Result;

pub mod args;
pub mod commands;
mod exit_status;
pub mod report;

pub use args::{Arguments, Command};
pub use exit_status::ExitStatus;

use commands::{CommandResult, export::export, generate::generate, init::init, query::query};

/// Dispatch to the command handler, print its report and pick the exit status.
///
/// Errors are returned unprinted; the caller reports them with
/// [`report::print_error`].
pub fn run_cli(args: Arguments) -> Result<ExitStatus> {
    let verbose = args.verbose();

    let Some(Arguments { command }) = args.with_command_or_help() else {
        return Ok(ExitStatus::Success);
    };

    let result = match command {
        Some(Command::Generate(cmd)) => generate(cmd)?,
        Some(Command::Export(cmd)) => export(cmd)?,
        Some(Command::Query(cmd)) => query(cmd)?,
        Some(Command::Init) => init()?,
        None => anyhow::bail!("No command provided. Use --help to see available commands."),
    };
    report::print(&result, verbose);

    Ok(exit_status_from_result(&result))
}

fn exit_status_from_result(result: &CommandResult) -> ExitStatus {
    if result.error_count > 0 {
        ExitStatus::Failure
    } else {
        ExitStatus::Success
    }
}
