use std::process::ExitCode;

use clap::Parser;
use spgm::cli::{Arguments, ExitStatus, report};
use tracing_subscriber::{EnvFilter, fmt::writer::BoxMakeWriter, prelude::*};

/// Log to stderr: `warn` by default, `debug` with `-v`, `SPGM_LOG` wins over both.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("SPGM_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
    let layer_stderr = tracing_subscriber::fmt::Layer::default()
        .without_time()
        .with_target(false)
        .with_writer(BoxMakeWriter::new(std::io::stderr));
    tracing_subscriber::registry().with(filter).with(layer_stderr).init();
}

fn main() -> ExitCode {
    let args = Arguments::parse();
    init_logging(args.verbose());

    match spgm::cli::run_cli(args) {
        Ok(status) => status.into(),
        Err(err) => {
            report::print_error(&err);
            ExitStatus::Error.into()
        }
    }
}
