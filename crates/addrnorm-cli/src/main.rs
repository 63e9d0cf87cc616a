//! addrnorm CLI - normalize postal addresses in CSV files.

mod cli;
mod commands;
mod logging;

use clap::Parser;
use cli::Cli;

fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.quiet);

    if let Err(e) = commands::normalize::run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
