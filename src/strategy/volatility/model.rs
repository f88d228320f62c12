//! Shared variance-model contract
//!
//! Every conditional-variance model works on percent-scaled, demeaned log
//! returns ("residuals") and is fitted by minimising the Gaussian negative
//! log-likelihood of its variance recursion.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::optimizer::{NelderMead, OptimizerError};

/// Log-likelihood constant ln(2π)
const LN_2PI: f64 = 1.837_877_066_409_345_3;
/// Variances below this are treated as degenerate
pub const MIN_VARIANCE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("Optimizer did not converge within {0} iterations")]
    NotConverged(usize),
    #[error("Degenerate fit: {0}")]
    Degenerate(String),
}

impl From<OptimizerError> for FitError {
    fn from(err: OptimizerError) -> Self {
        match err {
            OptimizerError::IterationBudgetExhausted(n) => FitError::NotConverged(n),
            OptimizerError::NonFiniteObjective => {
                FitError::Degenerate("objective not finite at optimum".to_string())
            }
        }
    }
}

/// Result of fitting one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedVariance {
    /// Model parameters in their natural (constrained) form
    pub params: Vec<f64>,
    /// One-step-ahead conditional variance after the last residual
    pub next_variance: f64,
    /// Maximised log-likelihood
    pub log_likelihood: f64,
    pub iterations: usize,
}

/// A conditionally heteroskedastic variance model.
///
/// `fit` estimates parameters from residuals, `forecast` iterates the
/// variance recursion forward and returns the per-period standard deviation
/// expected `horizon` steps ahead, in residual units.
pub trait VarianceModel: Send + Sync {
    fn name(&self) -> &'static str;

    fn fit(&self, residuals: &[f64], max_iterations: usize) -> Result<FittedVariance, FitError>;

    fn forecast(&self, fitted: &FittedVariance, horizon: usize) -> f64;
}

/// Recursion shared by the fitting helpers: maps unconstrained optimizer
/// coordinates to natural parameters and produces the conditional variance
/// path for a residual series.
pub(crate) trait Recursion {
    /// Natural parameters for unconstrained coordinates
    fn transform(&self, x: &[f64]) -> Vec<f64>;

    /// Starting coordinates given the sample variance
    fn initial_guess(&self, sample_variance: f64) -> Vec<f64>;

    /// Conditional variance at t+1 given the variance and residual at t
    fn step(&self, params: &[f64], variance: f64, residual: f64) -> f64;
}

/// Sample variance of residuals (population form)
pub fn sample_variance(residuals: &[f64]) -> f64 {
    if residuals.is_empty() {
        return 0.0;
    }
    residuals.iter().map(|e| e * e).sum::<f64>() / residuals.len() as f64
}

/// Gaussian negative log-likelihood of a variance recursion, backcast with
/// the sample variance. Returns infinity when the path leaves the valid range.
pub(crate) fn negative_log_likelihood<R: Recursion + ?Sized>(
    recursion: &R,
    params: &[f64],
    residuals: &[f64],
    backcast: f64,
) -> f64 {
    let mut variance = backcast;
    let mut nll = 0.0;
    for &e in residuals {
        if !variance.is_finite() || variance < MIN_VARIANCE {
            return f64::INFINITY;
        }
        nll += 0.5 * (LN_2PI + variance.ln() + e * e / variance);
        variance = recursion.step(params, variance, e);
    }
    if nll.is_finite() {
        nll
    } else {
        f64::INFINITY
    }
}

/// One-step-ahead variance after running the recursion over all residuals
pub(crate) fn terminal_variance<R: Recursion + ?Sized>(
    recursion: &R,
    params: &[f64],
    residuals: &[f64],
    backcast: f64,
) -> f64 {
    residuals
        .iter()
        .fold(backcast, |variance, &e| recursion.step(params, variance, e))
}

/// Maximum-likelihood fit of a recursion with Nelder-Mead
pub(crate) fn fit_recursion<R: Recursion + ?Sized>(
    recursion: &R,
    residuals: &[f64],
    max_iterations: usize,
) -> Result<FittedVariance, FitError> {
    let backcast = sample_variance(residuals);
    if backcast < MIN_VARIANCE {
        return Err(FitError::Degenerate("zero-variance residuals".to_string()));
    }

    let objective = |x: &[f64]| {
        let params = recursion.transform(x);
        negative_log_likelihood(recursion, &params, residuals, backcast)
    };
    let start = recursion.initial_guess(backcast);
    let solution = NelderMead::new(max_iterations).minimize(objective, &start)?;

    let params = recursion.transform(&solution.point);
    let next_variance = terminal_variance(recursion, &params, residuals, backcast);
    if !next_variance.is_finite() || next_variance < MIN_VARIANCE {
        return Err(FitError::Degenerate(format!(
            "terminal variance {}",
            next_variance
        )));
    }

    Ok(FittedVariance {
        params,
        next_variance,
        log_likelihood: -solution.value,
        iterations: solution.iterations,
    })
}

/// Logistic squashing onto (0, 1)
pub(crate) fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Inverse of `logistic`
pub(crate) fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}
