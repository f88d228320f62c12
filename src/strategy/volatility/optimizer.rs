//! Nelder-Mead simplex minimiser
//!
//! Derivative-free, deterministic minimisation with an iteration budget.
//! Standard coefficients: reflection 1, expansion 2, contraction 0.5,
//! shrink 0.5.

use thiserror::Error;

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;
/// Initial simplex offset per coordinate
const INITIAL_STEP: f64 = 0.25;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizerError {
    #[error("Iteration budget of {0} exhausted before convergence")]
    IterationBudgetExhausted(usize),
    #[error("Objective is not finite at the best vertex")]
    NonFiniteObjective,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub point: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
}

#[derive(Debug, Clone)]
pub struct NelderMead {
    max_iterations: usize,
    f_tolerance: f64,
}

impl NelderMead {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            f_tolerance: 1e-9,
        }
    }

    /// Converged once the simplex values agree to this relative tolerance
    pub fn with_tolerance(mut self, f_tolerance: f64) -> Self {
        self.f_tolerance = f_tolerance;
        self
    }

    pub fn minimize<F>(&self, objective: F, start: &[f64]) -> Result<Solution, OptimizerError>
    where
        F: Fn(&[f64]) -> f64,
    {
        let n = start.len();
        let eval = |x: &[f64]| {
            let v = objective(x);
            if v.is_nan() {
                f64::INFINITY
            } else {
                v
            }
        };

        let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
        simplex.push((start.to_vec(), eval(start)));
        for i in 0..n {
            let mut vertex = start.to_vec();
            vertex[i] += INITIAL_STEP;
            let value = eval(&vertex);
            simplex.push((vertex, value));
        }

        for iteration in 0..self.max_iterations {
            simplex.sort_by(|a, b| a.1.total_cmp(&b.1));

            if self.converged(&simplex) {
                let (point, value) = simplex.swap_remove(0);
                if !value.is_finite() {
                    return Err(OptimizerError::NonFiniteObjective);
                }
                return Ok(Solution {
                    point,
                    value,
                    iterations: iteration,
                });
            }

            let centroid = centroid(&simplex[..n]);
            let worst_value = simplex[n].1;
            let second_worst = simplex[n - 1].1;
            let best_value = simplex[0].1;

            let reflected = along(&centroid, &simplex[n].0, -REFLECTION);
            let reflected_value = eval(&reflected);

            if reflected_value < best_value {
                let expanded = along(&centroid, &simplex[n].0, -EXPANSION);
                let expanded_value = eval(&expanded);
                simplex[n] = if expanded_value < reflected_value {
                    (expanded, expanded_value)
                } else {
                    (reflected, reflected_value)
                };
                continue;
            }

            if reflected_value < second_worst {
                simplex[n] = (reflected, reflected_value);
                continue;
            }

            // Outside contraction when the reflection beat the worst vertex,
            // inside contraction otherwise.
            let (contracted, contracted_value) = if reflected_value < worst_value {
                let c = along(&centroid, &reflected, CONTRACTION);
                let v = eval(&c);
                (c, v)
            } else {
                let c = along(&centroid, &simplex[n].0, CONTRACTION);
                let v = eval(&c);
                (c, v)
            };

            if contracted_value < reflected_value.min(worst_value) {
                simplex[n] = (contracted, contracted_value);
                continue;
            }

            let best = simplex[0].0.clone();
            for vertex in simplex.iter_mut().skip(1) {
                let shrunk = along(&best, &vertex.0, SHRINK);
                let value = eval(&shrunk);
                *vertex = (shrunk, value);
            }
        }

        Err(OptimizerError::IterationBudgetExhausted(self.max_iterations))
    }

    fn converged(&self, sorted: &[(Vec<f64>, f64)]) -> bool {
        let best = &sorted[0];
        let worst = &sorted[sorted.len() - 1];
        if !best.1.is_finite() || !worst.1.is_finite() {
            return false;
        }
        (worst.1 - best.1).abs() <= self.f_tolerance * (1.0 + best.1.abs())
    }
}

fn centroid(vertices: &[(Vec<f64>, f64)]) -> Vec<f64> {
    let n = vertices.len() as f64;
    let dim = vertices[0].0.len();
    (0..dim)
        .map(|i| vertices.iter().map(|(x, _)| x[i]).sum::<f64>() / n)
        .collect()
}

/// `origin + t * (target - origin)`
fn along(origin: &[f64], target: &[f64], t: f64) -> Vec<f64> {
    origin
        .iter()
        .zip(target)
        .map(|(o, x)| o + t * (x - o))
        .collect()
}
