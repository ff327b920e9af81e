#![warn(missing_docs)]

//! Entry point for the `popup-tester` binary.

mod check;
mod cli;
mod error;
mod place;

use std::process;

use clap::Parser;
use tracing::error;

use crate::{
    cli::{Cli, Commands},
    error::Result,
};

/// Run the tester, exiting non-zero on failure.
fn main() {
    if let Err(err) = run() {
        error!("{err}");
        eprintln!("error: {err}");
        process::exit(1);
    }
}

/// Parse CLI arguments, install logging, and dispatch to the chosen subcommand.
fn run() -> Result<()> {
    let Cli { log, command } = Cli::parse();
    logging::init_subscriber(&log.spec());

    match command {
        Commands::Place(args) => place::run(&args),
        Commands::CheckConfig(args) => check::run(&args),
    }
}
