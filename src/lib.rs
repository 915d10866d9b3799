//! Disproportionality and EBGM signal engine for pharmacovigilance counts.
//!
//! The crate is split into two independent pipelines over the same 2x2
//! contingency concept:
//! - classical metrics (ROR, PRR, chi-square, Fisher exact, IC) computed
//!   per drug from per-item counts and shared totals, and
//! - an empirical Bayes pipeline that aggregates subgroup counts into
//!   (observed, expected) pairs, fits a two-component Gamma-Poisson mixture,
//!   and scores each drug with EBGM credible bounds.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod signals;
pub mod tables;
