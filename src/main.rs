use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;

use semsketch::{cli, logger};

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();

    // Initialize session log (overwrites previous session log)
    let level = if args.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    logger::init(level, true);

    cli::run(args)
}
