//! Symmetric GARCH(1,1)
//!
//! σ²ₜ₊₁ = ω + α·εₜ² + β·σ²ₜ
//!
//! Parameterised so that ω > 0, α, β ≥ 0 and α + β < 1 for every optimizer
//! coordinate: ω = exp(x₀), persistence p = 0.999·logistic(x₁) split into
//! α = p·s and β = p·(1 − s) with s = logistic(x₂).

use super::model::{
    fit_recursion, logistic, logit, FitError, FittedVariance, Recursion, VarianceModel,
};

/// Hard ceiling on α + β
pub(crate) const MAX_PERSISTENCE: f64 = 0.999;
const INITIAL_ALPHA: f64 = 0.05;
const INITIAL_BETA: f64 = 0.90;

#[derive(Debug, Clone, Copy, Default)]
pub struct Garch;

impl Recursion for Garch {
    fn transform(&self, x: &[f64]) -> Vec<f64> {
        let omega = x[0].exp();
        let persistence = MAX_PERSISTENCE * logistic(x[1]);
        let split = logistic(x[2]);
        vec![omega, persistence * split, persistence * (1.0 - split)]
    }

    fn initial_guess(&self, sample_variance: f64) -> Vec<f64> {
        let persistence = INITIAL_ALPHA + INITIAL_BETA;
        vec![
            (sample_variance * (1.0 - persistence)).ln(),
            logit(persistence / MAX_PERSISTENCE),
            logit(INITIAL_ALPHA / persistence),
        ]
    }

    fn step(&self, params: &[f64], variance: f64, residual: f64) -> f64 {
        let (omega, alpha, beta) = (params[0], params[1], params[2]);
        omega + alpha * residual * residual + beta * variance
    }
}

impl VarianceModel for Garch {
    fn name(&self) -> &'static str {
        "garch"
    }

    fn fit(&self, residuals: &[f64], max_iterations: usize) -> Result<FittedVariance, FitError> {
        fit_recursion(self, residuals, max_iterations)
    }

    fn forecast(&self, fitted: &FittedVariance, horizon: usize) -> f64 {
        let (omega, alpha, beta) = (fitted.params[0], fitted.params[1], fitted.params[2]);
        let mut variance = fitted.next_variance;
        for _ in 1..horizon {
            variance = omega + (alpha + beta) * variance;
        }
        variance.sqrt()
    }
}
