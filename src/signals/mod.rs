//! Signal computation layer: classical metrics and the EBGM pipeline.
//!
//! The two pipelines share the contingency concept but are otherwise
//! independent: `metrics_frame` is per-item and needs only totals, while
//! `ebgm_frame` aggregates subgroup strata, fits the mixture once, and scores
//! every drug from the shared fit.

pub mod contingency;
pub mod ebgm;
pub mod fisher;
pub mod metrics;
pub mod mgps;

use std::{fs::File, path::Path};

use anyhow::Result;
use polars::prelude::{CsvWriter, DataFrame, NamedFrom, SerWriter, Series};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::{config::Settings, tables};
use self::contingency::{ContingencyCell, ItemCounts, Totals};
use self::metrics::MetricsRow;

/// Round to 3 decimals, the reporting precision of IC and EBGM columns.
pub(crate) fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Compute the classical metrics table for every item.
///
/// Output columns follow the downstream contract exactly:
/// `[drug, n11, n12, n21, n22, ROR, ROR025, ROR975, p-value, PRR, PRR025,
/// PRR975, χ^2, IC, IC025, IC975]`.
pub fn metrics_frame(totals: &Totals, items: &[ItemCounts]) -> Result<DataFrame> {
    let rows: Vec<MetricsRow> = items
        .iter()
        .map(|item| {
            let cell = ContingencyCell::from_counts(item.n11, item.n1_plus, totals);
            metrics::score_cell(&item.drug, &cell)
        })
        .collect();

    let df = DataFrame::new(vec![
        Series::new(
            "drug".into(),
            rows.iter().map(|r| r.drug.clone()).collect::<Vec<_>>(),
        ),
        Series::new("n11".into(), rows.iter().map(|r| r.n11).collect::<Vec<_>>()),
        Series::new("n12".into(), rows.iter().map(|r| r.n12).collect::<Vec<_>>()),
        Series::new("n21".into(), rows.iter().map(|r| r.n21).collect::<Vec<_>>()),
        Series::new("n22".into(), rows.iter().map(|r| r.n22).collect::<Vec<_>>()),
        Series::new("ROR".into(), rows.iter().map(|r| r.ror).collect::<Vec<_>>()),
        Series::new(
            "ROR025".into(),
            rows.iter().map(|r| r.ror_lo).collect::<Vec<_>>(),
        ),
        Series::new(
            "ROR975".into(),
            rows.iter().map(|r| r.ror_hi).collect::<Vec<_>>(),
        ),
        Series::new(
            "p-value".into(),
            rows.iter().map(|r| r.p_value).collect::<Vec<_>>(),
        ),
        Series::new("PRR".into(), rows.iter().map(|r| r.prr).collect::<Vec<_>>()),
        Series::new(
            "PRR025".into(),
            rows.iter().map(|r| r.prr_lo).collect::<Vec<_>>(),
        ),
        Series::new(
            "PRR975".into(),
            rows.iter().map(|r| r.prr_hi).collect::<Vec<_>>(),
        ),
        Series::new(
            "χ^2".into(),
            rows.iter().map(|r| r.chi2).collect::<Vec<_>>(),
        ),
        Series::new("IC".into(), rows.iter().map(|r| r.ic).collect::<Vec<_>>()),
        Series::new(
            "IC025".into(),
            rows.iter().map(|r| r.ic_lo).collect::<Vec<_>>(),
        ),
        Series::new(
            "IC975".into(),
            rows.iter().map(|r| r.ic_hi).collect::<Vec<_>>(),
        ),
    ])?;
    Ok(df)
}

/// Aggregate subgroup strata, fit the mixture, and score every drug.
///
/// Output columns: `[drug_of_interest, O, E, EBGM, EBGM05, EBGM95,
/// MGPS_Signal]` with the signal flag serialised as "Yes"/"No".
pub fn ebgm_frame(rows: &[mgps::SubgroupRow], seed: u64, n_samples: usize) -> Result<DataFrame> {
    let pairs = mgps::aggregate_pairs(rows)?;
    info!(drugs = pairs.len(), "aggregated observed/expected pairs");

    let fit = mgps::fit_mixture(&pairs);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let scored = ebgm::score_pairs(&pairs, &fit.params, n_samples, &mut rng);

    let df = DataFrame::new(vec![
        Series::new(
            "drug_of_interest".into(),
            scored.iter().map(|r| r.drug.clone()).collect::<Vec<_>>(),
        ),
        Series::new(
            "O".into(),
            scored.iter().map(|r| r.observed).collect::<Vec<_>>(),
        ),
        Series::new(
            "E".into(),
            scored.iter().map(|r| r.expected).collect::<Vec<_>>(),
        ),
        Series::new(
            "EBGM".into(),
            scored.iter().map(|r| r.ebgm).collect::<Vec<_>>(),
        ),
        Series::new(
            "EBGM05".into(),
            scored.iter().map(|r| r.ebgm05).collect::<Vec<_>>(),
        ),
        Series::new(
            "EBGM95".into(),
            scored.iter().map(|r| r.ebgm95).collect::<Vec<_>>(),
        ),
        Series::new(
            "MGPS_Signal".into(),
            scored
                .iter()
                .map(|r| if r.signal { "Yes" } else { "No" })
                .collect::<Vec<_>>(),
        ),
    ])?;
    Ok(df)
}

/// Load the input tables, compute the metrics frame, and persist it.
pub fn run_metrics(settings: &Settings, totals_path: &Path, items_path: &Path) -> Result<()> {
    let totals = tables::load_totals(totals_path)?;
    let items = tables::load_items(items_path)?;
    let mut df = metrics_frame(&totals, &items)?;
    let out_path = settings.join_output("signal_metrics.csv");
    write_csv(&mut df, &out_path)?;
    info!(path = %out_path.display(), rows = df.height(), "wrote signal metrics");
    Ok(())
}

/// Load the subgroup table, run the EBGM pipeline, and persist the scores.
pub fn run_ebgm(
    settings: &Settings,
    subgroups_path: &Path,
    seed: u64,
    n_samples: usize,
) -> Result<()> {
    let rows = tables::load_subgroups(subgroups_path)?;
    let mut df = ebgm_frame(&rows, seed, n_samples)?;
    let out_path = settings.join_output("ebgm_scores.csv");
    write_csv(&mut df, &out_path)?;
    info!(path = %out_path.display(), rows = df.height(), seed, "wrote ebgm scores");
    Ok(())
}

fn write_csv(df: &mut DataFrame, out_path: &Path) -> Result<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(out_path)?;
    CsvWriter::new(&mut file).finish(df)?;
    Ok(())
}
