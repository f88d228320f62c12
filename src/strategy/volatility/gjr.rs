//! Asymmetric GJR-GARCH(1,1)
//!
//! σ²ₜ₊₁ = ω + (α + γ·1[εₜ < 0])·εₜ² + β·σ²ₜ
//!
//! Persistence α + γ/2 + β is p = 0.999·logistic(x₁), shared between the
//! three terms through a softmax over (x₂, x₃, 0).

use super::garch::MAX_PERSISTENCE;
use super::model::{
    fit_recursion, logistic, logit, FitError, FittedVariance, Recursion, VarianceModel,
};

const INITIAL_ALPHA: f64 = 0.03;
const INITIAL_GAMMA: f64 = 0.04;
const INITIAL_BETA: f64 = 0.90;

#[derive(Debug, Clone, Copy, Default)]
pub struct GjrGarch;

impl Recursion for GjrGarch {
    fn transform(&self, x: &[f64]) -> Vec<f64> {
        let omega = x[0].exp();
        let persistence = MAX_PERSISTENCE * logistic(x[1]);

        // Softmax with the beta logit pinned at zero
        let top = x[2].max(x[3]).max(0.0);
        let ea = (x[2] - top).exp();
        let eg = (x[3] - top).exp();
        let eb = (-top).exp();
        let total = ea + eg + eb;

        let alpha = persistence * ea / total;
        let half_gamma = persistence * eg / total;
        let beta = persistence * eb / total;
        vec![omega, alpha, 2.0 * half_gamma, beta]
    }

    fn initial_guess(&self, sample_variance: f64) -> Vec<f64> {
        let persistence = INITIAL_ALPHA + INITIAL_GAMMA / 2.0 + INITIAL_BETA;
        vec![
            (sample_variance * (1.0 - persistence)).ln(),
            logit(persistence / MAX_PERSISTENCE),
            (INITIAL_ALPHA / INITIAL_BETA).ln(),
            (INITIAL_GAMMA / 2.0 / INITIAL_BETA).ln(),
        ]
    }

    fn step(&self, params: &[f64], variance: f64, residual: f64) -> f64 {
        let (omega, alpha, gamma, beta) = (params[0], params[1], params[2], params[3]);
        let leverage = if residual < 0.0 { gamma } else { 0.0 };
        omega + (alpha + leverage) * residual * residual + beta * variance
    }
}

impl VarianceModel for GjrGarch {
    fn name(&self) -> &'static str {
        "gjr_garch"
    }

    fn fit(&self, residuals: &[f64], max_iterations: usize) -> Result<FittedVariance, FitError> {
        fit_recursion(self, residuals, max_iterations)
    }

    fn forecast(&self, fitted: &FittedVariance, horizon: usize) -> f64 {
        let (omega, alpha, gamma, beta) = (
            fitted.params[0],
            fitted.params[1],
            fitted.params[2],
            fitted.params[3],
        );
        let persistence = alpha + gamma / 2.0 + beta;
        let mut variance = fitted.next_variance;
        for _ in 1..horizon {
            variance = omega + persistence * variance;
        }
        variance.sqrt()
    }
}
