//! Asymmetric EGARCH(1,1)
//!
//! ln σ²ₜ₊₁ = ω + α·(|zₜ| − √(2/π)) + γ·zₜ + β·ln σ²ₜ,  zₜ = εₜ / σₜ
//!
//! Working in log-variance keeps σ² positive with ω unconstrained. Shock
//! terms are bounded to α ∈ (0, 0.5), γ ∈ (−0.5, 0.5); |β| < 1 is enforced
//! through β = 0.999·tanh(x₃). The log-variance itself is clamped to
//! ±`MAX_LOG_VARIANCE` so a wild trial point stays finite.

use std::f64::consts::FRAC_2_PI;

use super::model::{
    fit_recursion, logistic, logit, FitError, FittedVariance, Recursion, VarianceModel,
};

const MAX_BETA: f64 = 0.999;
const MAX_SHOCK: f64 = 0.5;
const INITIAL_ALPHA: f64 = 0.10;
const INITIAL_GAMMA: f64 = -0.05;
const INITIAL_BETA: f64 = 0.95;
const MAX_LOG_VARIANCE: f64 = 50.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct Egarch;

/// E|z| for a standard normal
fn expected_abs_z() -> f64 {
    FRAC_2_PI.sqrt()
}

impl Recursion for Egarch {
    fn transform(&self, x: &[f64]) -> Vec<f64> {
        vec![
            x[0],
            MAX_SHOCK * logistic(x[1]),
            MAX_SHOCK * x[2].tanh(),
            MAX_BETA * x[3].tanh(),
        ]
    }

    fn initial_guess(&self, sample_variance: f64) -> Vec<f64> {
        vec![
            sample_variance.ln() * (1.0 - INITIAL_BETA),
            logit(INITIAL_ALPHA / MAX_SHOCK),
            (INITIAL_GAMMA / MAX_SHOCK).atanh(),
            (INITIAL_BETA / MAX_BETA).atanh(),
        ]
    }

    fn step(&self, params: &[f64], variance: f64, residual: f64) -> f64 {
        let (omega, alpha, gamma, beta) = (params[0], params[1], params[2], params[3]);
        let z = residual / variance.sqrt();
        let log_next = omega + alpha * (z.abs() - expected_abs_z()) + gamma * z + beta * variance.ln();
        log_next.clamp(-MAX_LOG_VARIANCE, MAX_LOG_VARIANCE).exp()
    }
}

impl VarianceModel for Egarch {
    fn name(&self) -> &'static str {
        "egarch"
    }

    fn fit(&self, residuals: &[f64], max_iterations: usize) -> Result<FittedVariance, FitError> {
        fit_recursion(self, residuals, max_iterations)
    }

    fn forecast(&self, fitted: &FittedVariance, horizon: usize) -> f64 {
        let (omega, beta) = (fitted.params[0], fitted.params[3]);
        let mut log_variance = fitted.next_variance.ln();
        for _ in 1..horizon {
            log_variance = omega + beta * log_variance;
        }
        (0.5 * log_variance).exp()
    }
}
