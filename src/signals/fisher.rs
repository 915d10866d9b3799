//! Two-sided Fisher exact test on a 2x2 table.
//!
//! Point probabilities are hypergeometric and evaluated in log space via
//! `ln_gamma`, so large report totals do not underflow. The two-sided
//! p-value sums every table in the support whose point probability does not
//! exceed the observed one (with a small relative slack for ties).

use statrs::function::gamma::ln_gamma;

use super::contingency::ContingencyCell;

/// Relative slack when comparing point probabilities for the two-sided sum.
const TIE_EPS: f64 = 1e-7;

/// Two-sided Fisher exact p-value for the cell's 2x2 table.
///
/// A degenerate table (negative derived cell, empty grand total) yields NaN
/// rather than an error so that sibling metrics for the same item stay
/// usable.
pub fn fisher_exact(cell: &ContingencyCell) -> f64 {
    two_sided(cell.n11, cell.n12, cell.n21, cell.n22)
}

fn two_sided(a: i64, b: i64, c: i64, d: i64) -> f64 {
    if a < 0 || b < 0 || c < 0 || d < 0 {
        return f64::NAN;
    }
    let r1 = a + b;
    let r2 = c + d;
    let c1 = a + c;
    if r1 + r2 == 0 {
        return f64::NAN;
    }

    let lo = 0.max(c1 - r2);
    let hi = c1.min(r1);
    let ln_observed = ln_table_prob(a, r1, r2, c1);

    let mut p = 0.0;
    for k in lo..=hi {
        let ln_pk = ln_table_prob(k, r1, r2, c1);
        if ln_pk <= ln_observed + TIE_EPS {
            p += ln_pk.exp();
        }
    }
    p.min(1.0)
}

/// Log point probability of the table with upper-left cell k and fixed
/// margins (r1, r2, c1).
fn ln_table_prob(k: i64, r1: i64, r2: i64, c1: i64) -> f64 {
    ln_choose(r1, k) + ln_choose(r2, c1 - k) - ln_choose(r1 + r2, c1)
}

fn ln_choose(n: i64, k: i64) -> f64 {
    ln_gamma((n + 1) as f64) - ln_gamma((k + 1) as f64) - ln_gamma((n - k + 1) as f64)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn p(a: i64, b: i64, c: i64, d: i64) -> f64 {
        two_sided(a, b, c, d)
    }

    #[test]
    fn tea_tasting_table() {
        // Classic lady-tasting-tea table: p = 34/70.
        assert_relative_eq!(p(3, 1, 1, 3), 34.0 / 70.0, max_relative = 1e-12);
    }

    #[test]
    fn matches_reference_value() {
        // [[8, 2], [1, 5]] has a two-sided p of 400/11440.
        assert_relative_eq!(p(8, 2, 1, 5), 400.0 / 11440.0, max_relative = 1e-10);
    }

    #[test]
    fn single_table_support_is_certain() {
        // Zero event margin leaves one admissible table.
        assert_relative_eq!(p(0, 10, 0, 90), 1.0, max_relative = 1e-12);
    }

    #[test]
    fn negative_cell_yields_nan() {
        assert!(p(5, -1, 3, 4).is_nan());
    }
}
