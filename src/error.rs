//! Input-contract errors surfaced at the table boundary.

use thiserror::Error;

/// Violations of the tabular input contract. These fail fast and are never
/// retried; numerical degeneracies inside the engine are not errors and
/// propagate as NaN/inf in the affected metric instead.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A named column the contract requires is absent from the header row.
    #[error("{table} table: required column `{column}` is absent")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },
    /// A cell is missing or failed to parse as a count.
    #[error("{table} table: missing or unparseable `{column}` in row {row}")]
    BadCell {
        table: &'static str,
        column: &'static str,
        row: usize,
    },
    /// The totals table carries no data row, so n++ and n+1 are unknown.
    #[error("totals table has no data row")]
    EmptyTotals,
    /// A drug in the subgroup table has no "Overall" row supplying its
    /// background margins.
    #[error("no Overall subgroup row for drug `{drug}`")]
    MissingOverall { drug: String },
    /// The subgroup table contains no rows outside the Overall stratum.
    #[error("subgroup table has no non-Overall rows")]
    EmptySubgroups,
}
