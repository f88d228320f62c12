//! Volatility forecasting
//!
//! - `model`: the `VarianceModel` contract and likelihood helpers
//! - `garch`, `egarch`, `gjr`: the three fitted models
//! - `ewma`: closed-form fallback
//! - `optimizer`: Nelder-Mead used for maximum likelihood
//! - `forecaster`: averaged, clamped daily estimate

pub mod egarch;
pub mod ewma;
pub mod forecaster;
pub mod garch;
pub mod gjr;
pub mod model;
pub mod optimizer;

pub use egarch::Egarch;
pub use ewma::Ewma;
pub use forecaster::{VolatilityEstimate, VolatilityForecaster};
pub use garch::Garch;
pub use gjr::GjrGarch;
pub use model::{FitError, FittedVariance, VarianceModel};
pub use optimizer::{NelderMead, OptimizerError};
