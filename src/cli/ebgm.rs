//! CLI entry-point for the MGPS/EBGM pipeline.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use crate::{config::Settings, signals};

/// Args for the `ebgm` sub-command.
#[derive(Debug, Clone, ClapArgs)]
pub struct Args {
    /// Subgroup table (columns: Subgroup, drug_of_interest, n11, n12, n21, n22).
    #[arg(long)]
    pub subgroups: PathBuf,
    /// Override the sampling seed from configuration.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Override the Monte Carlo draw count from configuration.
    #[arg(long)]
    pub samples: Option<usize>,
}

#[instrument(skip(settings))]
pub fn run(args: Args, settings: Settings) -> Result<()> {
    let seed = args.seed.unwrap_or(settings.ebgm_seed);
    let samples = args.samples.unwrap_or(settings.ebgm_samples);
    signals::run_ebgm(&settings, &args.subgroups, seed, samples)
}
