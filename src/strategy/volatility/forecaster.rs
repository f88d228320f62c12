//! Daily volatility forecast
//!
//! Fits GARCH, EGARCH and GJR-GARCH to daily log returns, forecasts each
//! `horizon` periods ahead and averages the three per-period moves. The
//! average is clamped into the configured band. A model whose likelihood fit
//! fails is replaced by the EWMA estimate for that model only.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::egarch::Egarch;
use super::ewma::Ewma;
use super::garch::Garch;
use super::gjr::GjrGarch;
use super::model::{sample_variance, VarianceModel, MIN_VARIANCE};
use crate::domain::{EngineError, EngineResult};
use crate::strategy::params::VolatilityConfig;

/// Returns are scaled to percent before fitting for numerical conditioning
const RETURN_SCALE: f64 = 100.0;

/// Averaged expected move for one instrument and trading day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityEstimate {
    /// Forecast move per model as a fraction (0.02 = 2%)
    pub per_model_pct: BTreeMap<String, f64>,
    /// Clamped mean of the per-model moves
    pub averaged_pct: f64,
    /// Number of closes the forecast was computed from
    pub data_point_count: usize,
    pub as_of_day: NaiveDate,
    /// Models that fell back to EWMA
    pub degraded_models: Vec<String>,
}

impl VolatilityEstimate {
    pub fn is_degraded(&self) -> bool {
        !self.degraded_models.is_empty()
    }
}

pub struct VolatilityForecaster {
    config: VolatilityConfig,
    models: Vec<Box<dyn VarianceModel>>,
    fallback: Ewma,
}

impl std::fmt::Debug for VolatilityForecaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolatilityForecaster")
            .field("config", &self.config)
            .field(
                "models",
                &self.models.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for VolatilityForecaster {
    fn default() -> Self {
        Self::new(VolatilityConfig::default())
    }
}

impl VolatilityForecaster {
    pub fn new(config: VolatilityConfig) -> Self {
        let fallback = Ewma::new(config.ewma_lambda);
        Self {
            config,
            models: vec![Box::new(Garch), Box::new(Egarch), Box::new(GjrGarch)],
            fallback,
        }
    }

    pub fn config(&self) -> &VolatilityConfig {
        &self.config
    }

    /// Forecast from an ascending series of daily closes.
    ///
    /// Pure: the same closes always produce the same estimate.
    pub fn forecast(&self, closes: &[f64], as_of_day: NaiveDate) -> EngineResult<VolatilityEstimate> {
        if closes.len() < self.config.min_points {
            return Err(EngineError::InsufficientData {
                required: self.config.min_points,
                available: closes.len(),
            });
        }
        if let Some((i, price)) = closes
            .iter()
            .enumerate()
            .find(|(_, p)| !p.is_finite() || **p <= 0.0)
        {
            return Err(EngineError::NonFiniteInput(format!(
                "close #{} is {}",
                i, price
            )));
        }

        let residuals = demeaned_returns(closes);
        let mut per_model_pct = BTreeMap::new();
        let mut degraded_models = Vec::new();

        if sample_variance(&residuals) < MIN_VARIANCE {
            // Flat series: every model forecasts zero movement
            for model in &self.models {
                per_model_pct.insert(model.name().to_string(), 0.0);
            }
        } else {
            for model in &self.models {
                let sigma = match self.fit_and_forecast(model.as_ref(), &residuals) {
                    Some(sigma) => sigma,
                    None => {
                        degraded_models.push(model.name().to_string());
                        self.fallback_sigma(&residuals)
                    }
                };
                per_model_pct.insert(model.name().to_string(), sigma / RETURN_SCALE);
            }
        }

        let mean = per_model_pct.values().sum::<f64>() / per_model_pct.len() as f64;
        let averaged_pct = mean.clamp(self.config.floor_pct, self.config.cap_pct);

        debug!(
            models = ?per_model_pct,
            averaged_pct,
            degraded = degraded_models.len(),
            "Volatility forecast computed"
        );

        Ok(VolatilityEstimate {
            per_model_pct,
            averaged_pct,
            data_point_count: closes.len(),
            as_of_day,
            degraded_models,
        })
    }

    fn fit_and_forecast(&self, model: &dyn VarianceModel, residuals: &[f64]) -> Option<f64> {
        match model.fit(residuals, self.config.max_iterations) {
            Ok(fitted) => {
                let sigma = model.forecast(&fitted, self.config.horizon);
                if sigma.is_finite() && sigma >= 0.0 {
                    Some(sigma)
                } else {
                    debug!(model = model.name(), sigma, "Non-finite forecast, using EWMA");
                    None
                }
            }
            Err(e) => {
                debug!(model = model.name(), error = %e, "Fit failed, using EWMA");
                None
            }
        }
    }

    fn fallback_sigma(&self, residuals: &[f64]) -> f64 {
        self.fallback
            .fit(residuals, 0)
            .map(|fitted| self.fallback.forecast(&fitted, self.config.horizon))
            .unwrap_or(0.0)
    }
}

/// Percent-scaled log returns with their mean removed
fn demeaned_returns(closes: &[f64]) -> Vec<f64> {
    let returns: Vec<f64> = closes
        .windows(2)
        .map(|w| (w[1] / w[0]).ln() * RETURN_SCALE)
        .collect();
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    returns.into_iter().map(|r| r - mean).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::distributions::Distribution;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use statrs::distribution::Normal;
    use statrs::statistics::Statistics;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    /// Closes whose log returns have exactly the requested sample deviation
    /// within every 20-day block
    fn create_test_closes(seed: u64, days: usize, daily_vol: f64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let draws: Vec<f64> = (0..days).map(|_| normal.sample(&mut rng)).collect();

        let mut price = 100.0;
        let mut closes = vec![price];
        for block in draws.chunks(20) {
            let mean = block.iter().mean();
            let sd = block.iter().std_dev();
            for d in block {
                price *= ((d - mean) / sd * daily_vol).exp();
                closes.push(price);
            }
        }
        closes
    }

    #[test]
    fn test_insufficient_data() {
        let forecaster = VolatilityForecaster::default();
        let closes = vec![100.0; 29];
        assert_eq!(
            forecaster.forecast(&closes, day()),
            Err(EngineError::InsufficientData { required: 30, available: 29 })
        );
    }

    #[test]
    fn test_non_finite_input() {
        let forecaster = VolatilityForecaster::default();
        let mut closes = create_test_closes(1, 40, 0.02);
        closes[7] = f64::NAN;
        assert!(matches!(
            forecaster.forecast(&closes, day()),
            Err(EngineError::NonFiniteInput(_))
        ));

        closes[7] = -3.0;
        assert!(matches!(
            forecaster.forecast(&closes, day()),
            Err(EngineError::NonFiniteInput(_))
        ));
    }

    #[test]
    fn test_flat_series_clamps_to_floor() {
        let forecaster = VolatilityForecaster::default();
        let estimate = forecaster.forecast(&vec![250.0; 45], day()).unwrap();
        assert_eq!(estimate.averaged_pct, 0.01);
        assert_eq!(estimate.per_model_pct.len(), 3);
        assert_eq!(estimate.data_point_count, 45);
    }

    #[test]
    fn test_two_percent_daily_volatility() {
        let forecaster = VolatilityForecaster::default();
        let closes = create_test_closes(42, 60, 0.02);
        let estimate = forecaster.forecast(&closes, day()).unwrap();

        assert!(
            (0.015..=0.035).contains(&estimate.averaged_pct),
            "averaged {} from {:?}",
            estimate.averaged_pct,
            estimate.per_model_pct
        );
        assert!(estimate.per_model_pct.contains_key("garch"));
        assert!(estimate.per_model_pct.contains_key("egarch"));
        assert!(estimate.per_model_pct.contains_key("gjr_garch"));
        assert_eq!(estimate.as_of_day, day());
    }

    #[test]
    fn test_idempotent() {
        let forecaster = VolatilityForecaster::default();
        let closes = create_test_closes(7, 90, 0.03);
        let a = forecaster.forecast(&closes, day()).unwrap();
        let b = forecaster.forecast(&closes, day()).unwrap();
        assert_relative_eq!(a.averaged_pct, b.averaged_pct, epsilon = 1e-12);
    }

    #[test]
    fn test_always_clamped() {
        let forecaster = VolatilityForecaster::default();
        for (seed, vol) in [(3, 0.001), (4, 0.02), (5, 0.25)] {
            let closes = create_test_closes(seed, 50, vol);
            let estimate = forecaster.forecast(&closes, day()).unwrap();
            assert!(estimate.averaged_pct >= 0.01 && estimate.averaged_pct <= 0.10);
        }
    }

    #[test]
    fn test_exhausted_budget_degrades_every_model() {
        let config = VolatilityConfig {
            max_iterations: 1,
            ..VolatilityConfig::default()
        };
        let forecaster = VolatilityForecaster::new(config);
        let closes = create_test_closes(11, 60, 0.02);
        let estimate = forecaster.forecast(&closes, day()).unwrap();

        assert_eq!(estimate.degraded_models.len(), 3);
        assert!(estimate.is_degraded());
        // All three fell back to the same EWMA forecast
        let values: Vec<f64> = estimate.per_model_pct.values().copied().collect();
        assert_relative_eq!(values[0], values[1], epsilon = 1e-15);
        assert_relative_eq!(values[1], values[2], epsilon = 1e-15);
    }
}
