//! CLI entry-point for the classical metrics pipeline.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use crate::{config::Settings, signals};

/// Args for the `metrics` sub-command.
#[derive(Debug, Clone, ClapArgs)]
pub struct Args {
    /// Totals table (row 0: n++, n+1).
    #[arg(long)]
    pub totals: PathBuf,
    /// Per-item table (columns: drug, n1+, n11).
    #[arg(long)]
    pub items: PathBuf,
}

#[instrument(skip(settings))]
pub fn run(args: Args, settings: Settings) -> Result<()> {
    signals::run_metrics(&settings, &args.totals, &args.items)
}
