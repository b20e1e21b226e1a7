//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;
use d0s::output::OutputConfig;

/// d0s - Resolve docker0s manifests into deployment plans
#[derive(Parser, Debug)]
#[command(name = "d0s")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace); RUST_LOG overrides it
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve a manifest and print or write its deployment plan
    Plan(commands::plan::PlanArgs),

    /// Show each app's extends chain
    Tree(commands::tree::TreeArgs),

    /// Manage the checkout cache
    Cache(commands::cache::CacheArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&self.log_level))
            .format_timestamp(None)
            .init();
        let output = OutputConfig::from_env_and_flag(&self.color);

        match self.command {
            Commands::Plan(args) => commands::plan::execute(args, &output),
            Commands::Tree(args) => commands::tree::execute(args, &output),
            Commands::Cache(args) => commands::cache::execute(args, &output),
        }
    }
}
