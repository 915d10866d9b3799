//! 2x2 contingency cell construction from aggregate counts.

/// Shared scalars for one analysis run: grand total and event margin.
#[derive(Debug, Clone, Copy)]
pub struct Totals {
    /// Grand total of reports (n++).
    pub n_plus_plus: i64,
    /// Event margin (n+1): reports mentioning the event, any drug.
    pub n_plus1: i64,
}

/// Per-drug exposure counts as supplied by the upstream table.
#[derive(Debug, Clone)]
pub struct ItemCounts {
    pub drug: String,
    /// Exposure margin (n1+): reports mentioning the drug, any event.
    pub n1_plus: i64,
    /// Co-occurrence count (n11): reports mentioning drug and event.
    pub n11: i64,
}

/// One drug-event 2x2 table with its margins. Built once, immutable.
///
/// Derived cells are not validated for non-negativity: a negative n12/n21/n22
/// means the upstream counts are inconsistent, and the engine lets the
/// resulting NaN/inf metrics surface that downstream rather than aborting the
/// whole batch.
#[derive(Debug, Clone, Copy)]
pub struct ContingencyCell {
    pub n11: i64,
    pub n12: i64,
    pub n21: i64,
    pub n22: i64,
    pub n1_plus: i64,
    pub n2_plus: i64,
    pub n_plus1: i64,
    pub n_plus2: i64,
    pub n_plus_plus: i64,
}

impl ContingencyCell {
    /// Derive the full table from the per-drug counts and shared totals.
    pub fn from_counts(n11: i64, n1_plus: i64, totals: &Totals) -> Self {
        let n2_plus = totals.n_plus_plus - n1_plus;
        let n_plus2 = totals.n_plus_plus - totals.n_plus1;
        let n12 = n1_plus - n11;
        let n21 = totals.n_plus1 - n11;
        let n22 = n_plus2 - n12;
        Self {
            n11,
            n12,
            n21,
            n22,
            n1_plus,
            n2_plus,
            n_plus1: totals.n_plus1,
            n_plus2,
            n_plus_plus: totals.n_plus_plus,
        }
    }
}
