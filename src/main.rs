//! # datasetjson command-line entry point
//!
//! ```bash
//! datasetjson -i sdtm/ -o json/ --threads 4 --external
//! ```
//!
//! Exits with status 1 when the run cannot start (bad settings, output
//! directory that cannot be created). Individual files that fail to convert
//! are reported in the log and do not change the exit status.

#![warn(clippy::all, rust_2018_idioms)]

mod cli;

use anyhow::Result;
use clap::Parser as _;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    datasetjson::logging::init(&cli.log_options())?;
    cli::run(&cli)
}
