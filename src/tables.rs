//! Typed CSV input layer for the three engine tables.
//!
//! The engine itself only sees already-shaped counts; this module is the one
//! place aware of input column names and positions. Totals and per-item
//! tables are position-addressed (label, n1+, n11), the subgroup table is
//! header-addressed, matching the upstream extract conventions.

use std::path::Path;

use anyhow::{Context, Result};
use csv::StringRecord;
use tracing::info;

use crate::{
    error::SchemaError,
    signals::{
        contingency::{ItemCounts, Totals},
        mgps::SubgroupRow,
    },
};

/// Read the totals table: row 0, cell 0 is n++ and cell 1 is n+1.
pub fn load_totals(path: &Path) -> Result<Totals> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening totals table {}", path.display()))?;
    let record = match reader.records().next() {
        Some(record) => record?,
        None => return Err(SchemaError::EmptyTotals.into()),
    };
    let n_plus_plus = parse_count(&record, 0, "totals", "n++", 0)?;
    let n_plus1 = parse_count(&record, 1, "totals", "n+1", 0)?;
    info!(n_plus_plus, n_plus1, "loaded totals");
    Ok(Totals {
        n_plus_plus,
        n_plus1,
    })
}

/// Read the per-item table: column 0 = drug label, 1 = n1+, 2 = n11.
/// Row order is preserved into the output.
pub fn load_items(path: &Path) -> Result<Vec<ItemCounts>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening per-item table {}", path.display()))?;
    let mut items = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let drug = record
            .get(0)
            .ok_or(SchemaError::BadCell {
                table: "items",
                column: "drug",
                row: idx,
            })?
            .trim()
            .to_string();
        let n1_plus = parse_count(&record, 1, "items", "n1+", idx)?;
        let n11 = parse_count(&record, 2, "items", "n11", idx)?;
        items.push(ItemCounts { drug, n1_plus, n11 });
    }
    info!(rows = items.len(), "loaded per-item counts");
    Ok(items)
}

const SUBGROUP_COLUMNS: [&str; 6] = ["Subgroup", "drug_of_interest", "n11", "n12", "n21", "n22"];

/// Read the subgroup table by header name.
pub fn load_subgroups(path: &Path) -> Result<Vec<SubgroupRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening subgroup table {}", path.display()))?;
    let headers = reader.headers()?.clone();
    let mut indices = [0usize; 6];
    for (slot, name) in SUBGROUP_COLUMNS.iter().enumerate() {
        indices[slot] = headers
            .iter()
            .position(|h| h.trim() == *name)
            .ok_or(SchemaError::MissingColumn {
                table: "subgroups",
                column: name,
            })?;
    }

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let field = |slot: usize| -> Result<&str, SchemaError> {
            record.get(indices[slot]).ok_or(SchemaError::BadCell {
                table: "subgroups",
                column: SUBGROUP_COLUMNS[slot],
                row: idx,
            })
        };
        let subgroup = field(0)?.trim().to_string();
        let drug_of_interest = field(1)?.trim().to_string();
        let n11 = parse_count(&record, indices[2], "subgroups", "n11", idx)?;
        let n12 = parse_count(&record, indices[3], "subgroups", "n12", idx)?;
        let n21 = parse_count(&record, indices[4], "subgroups", "n21", idx)?;
        let n22 = parse_count(&record, indices[5], "subgroups", "n22", idx)?;
        rows.push(SubgroupRow {
            subgroup,
            drug_of_interest,
            n11,
            n12,
            n21,
            n22,
        });
    }
    info!(rows = rows.len(), "loaded subgroup counts");
    Ok(rows)
}

fn parse_count(
    record: &StringRecord,
    idx: usize,
    table: &'static str,
    column: &'static str,
    row: usize,
) -> Result<i64, SchemaError> {
    record
        .get(idx)
        .and_then(|v| v.trim().parse().ok())
        .ok_or(SchemaError::BadCell { table, column, row })
}
