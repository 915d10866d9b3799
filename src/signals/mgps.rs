//! MGPS two-component Gamma-Poisson mixture fitting.
//!
//! Subgroup strata are collapsed into one (observed, expected) pair per drug,
//! then the five mixture parameters are fitted by multi-start maximum
//! likelihood: five fixed initial vectors, a bounded Nelder-Mead local search
//! from each, lowest negative log-likelihood wins. Convergence of the winning
//! start is reported but deliberately not required.

use indexmap::IndexMap;
use rayon::prelude::*;
use statrs::distribution::{Continuous, Gamma};
use tracing::{info, warn};

use crate::error::SchemaError;

/// Distinguished subgroup label carrying the background margins.
pub const OVERALL_SUBGROUP: &str = "Overall";

/// Fixed initial parameter vectors `[alpha1, beta1, alpha2, beta2, p]`.
///
/// Each start represents a different shrinkage/spread regime: a heavy-shrink
/// low-shape component paired with a diffuse one, two symmetric mid-spread
/// components, and mixing weights on both sides of one half. Treated as a
/// configuration list; replacing an entry does not touch the fitting logic.
pub const INITIAL_POINTS: [[f64; 5]; 5] = [
    [0.2, 0.1, 2.0, 4.0, 1.0 / 3.0],
    [0.1, 0.1, 10.0, 10.0, 0.2],
    [0.3, 0.5, 6.0, 6.0, 0.5],
    [0.5, 0.3, 12.0, 12.0, 0.8],
    [0.2, 0.2, 5.0, 5.0, 0.4],
];

/// Lower bound shared by all five parameters; upper bound for p only.
const LOWER_BOUND: f64 = 1e-3;
const P_UPPER: f64 = 1.0 - 1e-3;

/// Additive floor inside the likelihood logarithm.
const DENSITY_FLOOR: f64 = 1e-12;

const MAX_ITER: usize = 2000;
const OBJECTIVE_TOL: f64 = 1e-10;

/// One subgroup stratum row for a drug of interest.
#[derive(Debug, Clone)]
pub struct SubgroupRow {
    pub subgroup: String,
    pub drug_of_interest: String,
    pub n11: i64,
    pub n12: i64,
    pub n21: i64,
    pub n22: i64,
}

/// Aggregated observed/expected counts per drug, with the background margins
/// taken from the drug's Overall row.
#[derive(Debug, Clone)]
pub struct ObservedExpectedPair {
    pub drug: String,
    pub observed: f64,
    pub expected: f64,
    pub n1_plus: i64,
    pub n_plus1: i64,
    pub n_plus_plus: i64,
}

/// Fitted mixture parameters shared by every item in a batch.
#[derive(Debug, Clone, Copy)]
pub struct MixtureParameters {
    pub alpha1: f64,
    pub beta1: f64,
    pub alpha2: f64,
    pub beta2: f64,
    pub p: f64,
}

/// Outcome of one optimizer start, kept for diagnostics.
#[derive(Debug, Clone)]
pub struct StartDiagnostics {
    pub initial: [f64; 5],
    pub fitted: [f64; 5],
    pub objective: f64,
    pub converged: bool,
    pub iterations: usize,
}

/// Result of the multi-start fit: winning parameters plus all per-start
/// diagnostics.
#[derive(Debug, Clone)]
pub struct MixtureFit {
    pub params: MixtureParameters,
    pub objective: f64,
    pub converged: bool,
    pub starts: Vec<StartDiagnostics>,
}

/// Collapse subgroup strata into one (observed, expected) pair per drug.
///
/// Every non-Overall stratum contributes its own independence expectation
/// `(n1+ * n+1) / n++` computed from that stratum's four cells; observed and
/// expected counts are summed per drug. The Overall stratum supplies the
/// background margins and contributes nothing to the sums.
pub fn aggregate_pairs(rows: &[SubgroupRow]) -> Result<Vec<ObservedExpectedPair>, SchemaError> {
    let mut overall: IndexMap<&str, (i64, i64, i64)> = IndexMap::new();
    let mut sums: IndexMap<&str, (f64, f64)> = IndexMap::new();

    for row in rows {
        let n1_plus = row.n11 + row.n12;
        let n_plus1 = row.n11 + row.n21;
        let n_plus_plus = row.n11 + row.n12 + row.n21 + row.n22;
        if row.subgroup == OVERALL_SUBGROUP {
            overall.insert(
                row.drug_of_interest.as_str(),
                (n1_plus, n_plus1, n_plus_plus),
            );
        } else {
            let expected = (n1_plus as f64) * (n_plus1 as f64) / (n_plus_plus as f64);
            let entry = sums.entry(row.drug_of_interest.as_str()).or_insert((0.0, 0.0));
            entry.0 += row.n11 as f64;
            entry.1 += expected;
        }
    }

    if sums.is_empty() {
        return Err(SchemaError::EmptySubgroups);
    }

    sums.sort_keys();
    let mut pairs = Vec::with_capacity(sums.len());
    for (drug, (observed, expected)) in sums {
        let (n1_plus, n_plus1, n_plus_plus) =
            overall
                .get(drug)
                .copied()
                .ok_or_else(|| SchemaError::MissingOverall {
                    drug: drug.to_string(),
                })?;
        pairs.push(ObservedExpectedPair {
            drug: drug.to_string(),
            observed,
            expected,
            n1_plus,
            n_plus1,
            n_plus_plus,
        });
    }
    Ok(pairs)
}

/// Fit the mixture by multi-start maximum likelihood.
///
/// The five starts share no state and run in parallel; the winner is the
/// lowest objective regardless of its convergence flag, preserving the
/// historical selection rule. Diagnostics for every start are retained.
pub fn fit_mixture(pairs: &[ObservedExpectedPair]) -> MixtureFit {
    let starts: Vec<StartDiagnostics> = INITIAL_POINTS
        .par_iter()
        .map(|&initial| {
            let result = nelder_mead(|x| negative_log_likelihood(x, pairs), initial);
            StartDiagnostics {
                initial,
                fitted: result.x,
                objective: result.fx,
                converged: result.converged,
                iterations: result.iterations,
            }
        })
        .collect();

    let best = starts
        .iter()
        .min_by(|a, b| a.objective.total_cmp(&b.objective))
        .cloned()
        .expect("INITIAL_POINTS is non-empty");

    if !best.converged {
        warn!(
            objective = best.objective,
            "best mixture start did not converge; keeping lowest objective"
        );
    }
    info!(
        objective = best.objective,
        converged = best.converged,
        "fitted gamma mixture"
    );

    let [alpha1, beta1, alpha2, beta2, p] = best.fitted;
    MixtureFit {
        params: MixtureParameters {
            alpha1,
            beta1,
            alpha2,
            beta2,
            p,
        },
        objective: best.objective,
        converged: best.converged,
        starts,
    }
}

/// Negative log-likelihood of the two-component Gamma mixture.
///
/// Component densities use scale `1 / (beta * e)`, i.e. rate `beta * e`.
/// Out-of-domain parameter vectors evaluate to +inf so the optimizer treats
/// them as infeasible.
pub fn negative_log_likelihood(params: &[f64; 5], pairs: &[ObservedExpectedPair]) -> f64 {
    let [alpha1, beta1, alpha2, beta2, p] = *params;
    if alpha1 <= 0.0 || beta1 <= 0.0 || alpha2 <= 0.0 || beta2 <= 0.0 || p <= 0.0 || p >= 1.0 {
        return f64::INFINITY;
    }
    let mut log_l = 0.0;
    for pair in pairs {
        let f1 = gamma_pdf(pair.observed, alpha1, beta1 * pair.expected);
        let f2 = gamma_pdf(pair.observed, alpha2, beta2 * pair.expected);
        log_l += (p * f1 + (1.0 - p) * f2 + DENSITY_FLOOR).ln();
    }
    -log_l
}

fn gamma_pdf(x: f64, shape: f64, rate: f64) -> f64 {
    match Gamma::new(shape, rate) {
        Ok(dist) => dist.pdf(x),
        // Degenerate rate (zero expected count): the density vanishes and
        // the additive floor keeps the logarithm finite.
        Err(_) => 0.0,
    }
}

struct NmOutcome {
    x: [f64; 5],
    fx: f64,
    converged: bool,
    iterations: usize,
}

fn project(mut x: [f64; 5]) -> [f64; 5] {
    for v in x.iter_mut().take(4) {
        if *v < LOWER_BOUND {
            *v = LOWER_BOUND;
        }
    }
    x[4] = x[4].clamp(LOWER_BOUND, P_UPPER);
    x
}

/// Bounded Nelder-Mead over the five mixture parameters.
///
/// Bounds are enforced by projecting every candidate vertex back into the
/// feasible box. Convergence is declared when the simplex objective spread
/// falls below an absolute-plus-relative tolerance.
fn nelder_mead<F: Fn(&[f64; 5]) -> f64>(f: F, x0: [f64; 5]) -> NmOutcome {
    let x0 = project(x0);
    let mut simplex: Vec<([f64; 5], f64)> = Vec::with_capacity(6);
    simplex.push((x0, f(&x0)));
    for i in 0..5 {
        let mut xi = x0;
        xi[i] = if xi[i] != 0.0 { xi[i] * 1.05 } else { 2.5e-4 };
        let xi = project(xi);
        simplex.push((xi, f(&xi)));
    }

    let mut converged = false;
    let mut iterations = 0;
    while iterations < MAX_ITER {
        iterations += 1;
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        let f_best = simplex[0].1;
        let f_worst = simplex[5].1;
        if (f_worst - f_best).abs() <= OBJECTIVE_TOL * (1.0 + f_best.abs()) {
            converged = true;
            break;
        }

        let mut centroid = [0.0; 5];
        for (x, _) in &simplex[..5] {
            for i in 0..5 {
                centroid[i] += x[i] / 5.0;
            }
        }
        let worst_x = simplex[5].0;
        let step = |scale: f64| -> [f64; 5] {
            project(std::array::from_fn(|i| {
                centroid[i] + scale * (centroid[i] - worst_x[i])
            }))
        };

        let reflected = step(1.0);
        let f_reflected = f(&reflected);
        if f_reflected < simplex[0].1 {
            let expanded = step(2.0);
            let f_expanded = f(&expanded);
            simplex[5] = if f_expanded < f_reflected {
                (expanded, f_expanded)
            } else {
                (reflected, f_reflected)
            };
        } else if f_reflected < simplex[4].1 {
            simplex[5] = (reflected, f_reflected);
        } else {
            let (contracted, f_contracted) = if f_reflected < simplex[5].1 {
                let outside = step(0.5);
                let fx = f(&outside);
                (outside, fx)
            } else {
                let inside = step(-0.5);
                let fx = f(&inside);
                (inside, fx)
            };
            if f_contracted < simplex[5].1.min(f_reflected) {
                simplex[5] = (contracted, f_contracted);
            } else {
                let best_x = simplex[0].0;
                for vertex in simplex.iter_mut().skip(1) {
                    let shrunk = project(std::array::from_fn(|i| {
                        best_x[i] + 0.5 * (vertex.0[i] - best_x[i])
                    }));
                    let fx = f(&shrunk);
                    *vertex = (shrunk, fx);
                }
            }
        }
    }

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    NmOutcome {
        x: simplex[0].0,
        fx: simplex[0].1,
        converged,
        iterations,
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn subgroup(subgroup: &str, drug: &str, cells: [i64; 4]) -> SubgroupRow {
        SubgroupRow {
            subgroup: subgroup.to_string(),
            drug_of_interest: drug.to_string(),
            n11: cells[0],
            n12: cells[1],
            n21: cells[2],
            n22: cells[3],
        }
    }

    #[test]
    fn aggregates_observed_and_expected_per_drug() {
        let rows = vec![
            subgroup("Overall", "drugA", [30, 70, 170, 9730]),
            subgroup("Male", "drugA", [20, 40, 80, 4860]),
            subgroup("Female", "drugA", [10, 30, 90, 4870]),
        ];
        let pairs = aggregate_pairs(&rows).expect("aggregation succeeds");
        assert_eq!(pairs.len(), 1);
        let pair = &pairs[0];
        assert_eq!(pair.drug, "drugA");
        assert_relative_eq!(pair.observed, 30.0);
        // Male: (60 * 100) / 5000, Female: (40 * 100) / 5000.
        assert_relative_eq!(pair.expected, 1.2 + 0.8, max_relative = 1e-12);
        assert_eq!(pair.n1_plus, 100);
        assert_eq!(pair.n_plus1, 200);
        assert_eq!(pair.n_plus_plus, 10_000);
    }

    #[test]
    fn missing_overall_row_is_an_error() {
        let rows = vec![subgroup("Male", "drugA", [5, 5, 5, 85])];
        let err = aggregate_pairs(&rows).unwrap_err();
        assert!(matches!(err, SchemaError::MissingOverall { .. }));
    }

    #[test]
    fn no_strata_is_an_error() {
        let rows = vec![subgroup("Overall", "drugA", [5, 5, 5, 85])];
        let err = aggregate_pairs(&rows).unwrap_err();
        assert!(matches!(err, SchemaError::EmptySubgroups));
    }

    #[test]
    fn likelihood_is_infinite_outside_bounds() {
        let pairs = vec![ObservedExpectedPair {
            drug: "drugA".to_string(),
            observed: 3.0,
            expected: 1.5,
            n1_plus: 10,
            n_plus1: 10,
            n_plus_plus: 100,
        }];
        assert!(negative_log_likelihood(&[-0.1, 1.0, 1.0, 1.0, 0.5], &pairs).is_infinite());
        assert!(negative_log_likelihood(&[1.0, 1.0, 1.0, 1.0, 1.5], &pairs).is_infinite());
        assert!(negative_log_likelihood(&[0.5, 0.5, 2.0, 2.0, 0.5], &pairs).is_finite());
    }

    #[test]
    fn nelder_mead_minimises_a_quadratic() {
        // Minimum at (2, 3, 1, 1, 0.5), inside the feasible box.
        let target = [2.0, 3.0, 1.0, 1.0, 0.5];
        let objective = |x: &[f64; 5]| -> f64 {
            x.iter()
                .zip(target.iter())
                .map(|(xi, ti)| (xi - ti) * (xi - ti))
                .sum()
        };
        let outcome = nelder_mead(objective, [1.0, 1.0, 2.0, 2.0, 0.3]);
        assert!(outcome.converged);
        for (xi, ti) in outcome.x.iter().zip(target.iter()) {
            assert_relative_eq!(*xi, *ti, epsilon = 1e-3);
        }
    }

    #[test]
    fn fit_selects_lowest_objective() {
        let pairs: Vec<ObservedExpectedPair> = (1..=8)
            .map(|i| ObservedExpectedPair {
                drug: format!("drug{i}"),
                observed: i as f64,
                expected: i as f64 * 0.9,
                n1_plus: 100,
                n_plus1: 100,
                n_plus_plus: 10_000,
            })
            .collect();
        let fit = fit_mixture(&pairs);
        assert_eq!(fit.starts.len(), INITIAL_POINTS.len());
        let min_start = fit
            .starts
            .iter()
            .map(|s| s.objective)
            .fold(f64::INFINITY, f64::min);
        assert!(fit.objective <= min_start + 1e-6);
        assert!(fit.params.alpha1 >= 1e-3 && fit.params.beta1 >= 1e-3);
        assert!(fit.params.p > 0.0 && fit.params.p < 1.0);
    }
}
