//! Exponentially weighted moving-average variance
//!
//! σ²ₜ₊₁ = λ·σ²ₜ + (1 − λ)·εₜ²
//!
//! Closed form, never fails on non-degenerate input. Used in place of a
//! model whose likelihood fit did not converge.

use super::model::{
    negative_log_likelihood, sample_variance, terminal_variance, FitError, FittedVariance,
    Recursion, VarianceModel, MIN_VARIANCE,
};

/// RiskMetrics daily decay
pub const DEFAULT_LAMBDA: f64 = 0.94;

#[derive(Debug, Clone, Copy)]
pub struct Ewma {
    lambda: f64,
}

impl Ewma {
    pub fn new(lambda: f64) -> Self {
        Self { lambda }
    }
}

impl Default for Ewma {
    fn default() -> Self {
        Self::new(DEFAULT_LAMBDA)
    }
}

impl Recursion for Ewma {
    fn transform(&self, _x: &[f64]) -> Vec<f64> {
        vec![self.lambda]
    }

    fn initial_guess(&self, _sample_variance: f64) -> Vec<f64> {
        Vec::new()
    }

    fn step(&self, params: &[f64], variance: f64, residual: f64) -> f64 {
        let lambda = params[0];
        lambda * variance + (1.0 - lambda) * residual * residual
    }
}

impl VarianceModel for Ewma {
    fn name(&self) -> &'static str {
        "ewma"
    }

    fn fit(&self, residuals: &[f64], _max_iterations: usize) -> Result<FittedVariance, FitError> {
        let backcast = sample_variance(residuals);
        if backcast < MIN_VARIANCE {
            return Err(FitError::Degenerate("zero-variance residuals".to_string()));
        }
        let params = vec![self.lambda];
        let next_variance = terminal_variance(self, &params, residuals, backcast);
        let nll = negative_log_likelihood(self, &params, residuals, backcast);
        Ok(FittedVariance {
            params,
            next_variance,
            log_likelihood: -nll,
            iterations: 0,
        })
    }

    /// EWMA variance is a martingale: the forecast is flat in the horizon
    fn forecast(&self, fitted: &FittedVariance, _horizon: usize) -> f64 {
        fitted.next_variance.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_constant_squares_keep_variance() {
        let residuals = vec![3.0, -3.0, 3.0, -3.0, 3.0];
        let fitted = Ewma::default().fit(&residuals, 0).unwrap();
        assert_relative_eq!(fitted.next_variance, 9.0, epsilon = 1e-12);
        assert_relative_eq!(Ewma::default().forecast(&fitted, 10), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_recent_shock_dominates() {
        let mut residuals = vec![1.0; 50];
        residuals.push(10.0);
        let fitted = Ewma::default().fit(&residuals, 0).unwrap();
        // 0.94 * ~1 + 0.06 * 100
        assert!(fitted.next_variance > 6.0);
    }

    #[test]
    fn test_degenerate_input() {
        assert!(Ewma::default().fit(&[0.0; 40], 0).is_err());
    }
}
