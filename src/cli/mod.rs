//! Command-line interface wiring for dispro.

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::Settings;

pub mod ebgm;
pub mod metrics;

/// Top-level CLI definition.
#[derive(Debug, Parser)]
#[command(author, version, about = "Disproportionality and EBGM signal engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Parse CLI arguments from the environment.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Dispatch the selected sub-command.
    pub fn dispatch(self, settings: Settings) -> Result<()> {
        match self.command {
            Commands::Metrics(args) => metrics::run(args, settings),
            Commands::Ebgm(args) => ebgm::run(args, settings),
        }
    }
}

/// Supported sub-commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compute ROR/PRR/chi-square/Fisher/IC per drug.
    Metrics(metrics::Args),
    /// Fit the MGPS mixture and score EBGM per drug.
    Ebgm(ebgm::Args),
}
