//! # d0s CLI
//!
//! Binary entry point for the `d0s` command-line tool. It parses arguments
//! with `clap` and dispatches to a command; all resolution logic lives in the
//! `d0s` library crate.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
