// LayerFX command-line entry point.  All work happens in `layerfx::cli`.

use std::process::ExitCode;

use clap::Parser;
use layerfx::cli::{self, CliArgs};

fn main() -> ExitCode {
    // Initialize session log (overwrites previous session log)
    layerfx::logger::init();

    let args = CliArgs::parse();
    cli::run(args)
}
