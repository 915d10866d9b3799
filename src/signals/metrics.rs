//! Disproportionality metrics per contingency cell.
//!
//! Every metric is a pure function of one 2x2 table. Zero or negative cells
//! are never rejected: the affected metric degrades to NaN or infinity while
//! the remaining metrics for the same drug stay valid.

use super::{contingency::ContingencyCell, fisher, round3};

// Fixed priors for the closed-form information component (WHO-style
// shrinkage). Not fitted; shared by every cell in a run.
const IC_ALPHA: f64 = 2.0;
const IC_BETA: f64 = 2.0;
const IC_ALPHA1: f64 = 1.0;
const IC_BETA1: f64 = 1.0;
const IC_GAMMA11: f64 = 1.0;

/// Per-drug metric record, emitted once per contingency cell.
#[derive(Debug, Clone)]
pub struct MetricsRow {
    pub drug: String,
    pub n11: i64,
    pub n12: i64,
    pub n21: i64,
    pub n22: i64,
    pub ror: f64,
    pub ror_lo: f64,
    pub ror_hi: f64,
    pub p_value: f64,
    pub prr: f64,
    pub prr_lo: f64,
    pub prr_hi: f64,
    pub chi2: f64,
    pub ic: f64,
    pub ic_lo: f64,
    pub ic_hi: f64,
}

/// Compute the full metric set for one drug-event cell.
pub fn score_cell(drug: &str, cell: &ContingencyCell) -> MetricsRow {
    let (ror, ror_lo, ror_hi) = ror_with_ci(cell);
    let (prr, prr_lo, prr_hi) = prr_with_ci(cell);
    let (ic, ic_lo, ic_hi) = information_component(cell);
    MetricsRow {
        drug: drug.to_string(),
        n11: cell.n11,
        n12: cell.n12,
        n21: cell.n21,
        n22: cell.n22,
        ror,
        ror_lo,
        ror_hi,
        p_value: fisher::fisher_exact(cell),
        prr,
        prr_lo,
        prr_hi,
        chi2: chi_square(cell),
        ic,
        ic_lo,
        ic_hi,
    }
}

/// Reporting odds ratio with a 95% log-scale Wald interval.
pub fn ror_with_ci(cell: &ContingencyCell) -> (f64, f64, f64) {
    let (a, b, c, d) = as_f64(cell);
    let ror = (a * d) / (b * c);
    let se = (1.0 / a + 1.0 / b + 1.0 / c + 1.0 / d).sqrt();
    let lo = (ror.ln() - 1.96 * se).exp();
    let hi = (ror.ln() + 1.96 * se).exp();
    (ror, lo, hi)
}

/// Proportional reporting ratio with a 95% log-scale interval, passed
/// through [`clean_prr`].
pub fn prr_with_ci(cell: &ContingencyCell) -> (f64, f64, f64) {
    let a = cell.n11 as f64;
    let c = cell.n21 as f64;
    let n1_plus = cell.n1_plus as f64;
    let n2_plus = cell.n2_plus as f64;
    let prr = (a * n2_plus) / (n1_plus * c);
    let se = (1.0 / a - 1.0 / n1_plus + 1.0 / c - 1.0 / n2_plus).sqrt();
    let lo = (prr.ln() - 1.96 * se).exp();
    let hi = (prr.ln() + 1.96 * se).exp();
    (clean_prr(prr), clean_prr(lo), clean_prr(hi))
}

/// Compatibility cleanup applied to PRR and its bounds: NaN and -inf are
/// collapsed to 0 while +inf is kept. Deliberately asymmetric to match the
/// historical pipeline; isolated here so the policy can be revisited in one
/// place.
pub fn clean_prr(x: f64) -> f64 {
    if x.is_nan() || x == f64::NEG_INFINITY {
        0.0
    } else {
        x
    }
}

/// Pearson chi-square statistic against independence-model expected counts.
pub fn chi_square(cell: &ContingencyCell) -> f64 {
    let n = cell.n_plus_plus as f64;
    let rows = [cell.n1_plus as f64, cell.n2_plus as f64];
    let cols = [cell.n_plus1 as f64, cell.n_plus2 as f64];
    let observed = [
        [cell.n11 as f64, cell.n12 as f64],
        [cell.n21 as f64, cell.n22 as f64],
    ];
    let mut chi2 = 0.0;
    for (i, row) in rows.iter().enumerate() {
        for (j, col) in cols.iter().enumerate() {
            let expected = row * col / n;
            let diff = observed[i][j] - expected;
            chi2 += diff * diff / expected;
        }
    }
    chi2
}

/// Closed-form WHO-style information component with shrinkage priors.
///
/// Returns (ic, lower, upper), each rounded to 3 decimals; the bounds are
/// the expectation plus/minus two posterior standard deviations.
pub fn information_component(cell: &ContingencyCell) -> (f64, f64, f64) {
    let a = cell.n11 as f64;
    let a1 = cell.n1_plus as f64;
    let a2 = cell.n_plus1 as f64;
    let n = cell.n_plus_plus as f64;

    let gamma = IC_GAMMA11 * (n + IC_ALPHA) * (n + IC_BETA) / ((a1 + IC_ALPHA1) * (a2 + IC_BETA1));

    let num = (a + IC_GAMMA11) * (n + IC_ALPHA) * (n + IC_BETA);
    let den = (n + gamma) * (a1 + IC_ALPHA1) * (a2 + IC_BETA1);
    let e_ic = (num / den).log2();

    let v1 = (n - a + gamma - IC_GAMMA11) / ((a + IC_GAMMA11) * (n + gamma));
    let v2 = (n - a1 + IC_ALPHA - IC_ALPHA1) / ((a1 + IC_ALPHA1) * (n + IC_ALPHA));
    let v3 = (n - a2 + IC_BETA - IC_BETA1) / ((a2 + IC_BETA1) * (n + IC_BETA));
    let ln2 = std::f64::consts::LN_2;
    let v_ic = (v1 + v2 + v3) / (ln2 * ln2);
    let sd = v_ic.sqrt();

    (
        round3(e_ic),
        round3(e_ic - 2.0 * sd),
        round3(e_ic + 2.0 * sd),
    )
}

fn as_f64(cell: &ContingencyCell) -> (f64, f64, f64, f64) {
    (
        cell.n11 as f64,
        cell.n12 as f64,
        cell.n21 as f64,
        cell.n22 as f64,
    )
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::signals::contingency::Totals;

    fn reference_cell() -> ContingencyCell {
        let totals = Totals {
            n_plus_plus: 10_000,
            n_plus1: 100,
        };
        ContingencyCell::from_counts(25, 100, &totals)
    }

    #[test]
    fn ror_matches_cross_product() {
        let (ror, lo, hi) = ror_with_ci(&reference_cell());
        assert_relative_eq!(ror, (25.0 * 9800.0) / (75.0 * 75.0), max_relative = 1e-12);
        assert!(lo < ror && ror < hi);
    }

    #[test]
    fn prr_matches_reference() {
        let (prr, lo, hi) = prr_with_ci(&reference_cell());
        assert_relative_eq!(prr, 33.0, max_relative = 1e-12);
        assert!(lo < prr && prr < hi);
    }

    #[test]
    fn chi_square_matches_reference() {
        let chi2 = chi_square(&reference_cell());
        assert_relative_eq!(chi2, 587.6, max_relative = 1e-3);
    }

    #[test]
    fn zero_cell_gives_infinite_ror() {
        let totals = Totals {
            n_plus_plus: 1_000,
            n_plus1: 50,
        };
        // n11 == n1+ makes n12 zero.
        let cell = ContingencyCell::from_counts(10, 10, &totals);
        let (ror, _, hi) = ror_with_ci(&cell);
        assert!(ror.is_infinite() && ror > 0.0);
        assert!(hi.is_infinite() || hi.is_nan());
    }

    #[test]
    fn clean_prr_policy() {
        assert_eq!(clean_prr(f64::NAN), 0.0);
        assert_eq!(clean_prr(f64::NEG_INFINITY), 0.0);
        assert_eq!(clean_prr(f64::INFINITY), f64::INFINITY);
        assert_eq!(clean_prr(1.25), 1.25);
    }

    #[test]
    fn ic_shrinks_to_zero_when_observed_matches_expected() {
        // n11 equals the independence expectation (100 * 100 / 10000 = 1).
        let totals = Totals {
            n_plus_plus: 10_000,
            n_plus1: 100,
        };
        let cell = ContingencyCell::from_counts(1, 100, &totals);
        let (ic, lo, hi) = information_component(&cell);
        assert!(ic.abs() < 0.1);
        assert!(lo < ic && ic < hi);
    }

    #[test]
    fn ic_increases_with_observed_count() {
        let totals = Totals {
            n_plus_plus: 10_000,
            n_plus1: 100,
        };
        let mut last = f64::NEG_INFINITY;
        for n11 in [1, 5, 10, 25, 50] {
            let cell = ContingencyCell::from_counts(n11, 100, &totals);
            let (ic, _, _) = information_component(&cell);
            assert!(ic > last, "IC must grow with n11 (n11={n11})");
            last = ic;
        }
    }
}
