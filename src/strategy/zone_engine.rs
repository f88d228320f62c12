//! Zone Engine
//!
//! Builds the daily ladder of support/resistance levels around the reference
//! open from the forecast expected move:
//! - `upper_bound = open * (1 + pct)`, `lower_bound = open * (1 - pct)`
//! - `subdivisions` equally spaced levels between the open and each bound
//! - quadrant boundaries at ±pct/2 and ±pct
//!
//! Levels are labelled `R1..Rn` above the open and `S1..Sn` below it, so the
//! outermost labels (`Rn`, `Sn`) are the bounds themselves.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{EngineError, EngineResult};
use crate::strategy::params::ZoneConfig;

/// Region of the zone map a price falls in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneQuadrant {
    /// Above the upper bound
    AboveUpper,
    /// Between +pct/2 and the upper bound
    UpperOuter,
    /// Between the open and +pct/2
    UpperInner,
    /// Between -pct/2 and the open
    LowerInner,
    /// Between the lower bound and -pct/2
    LowerOuter,
    /// Below the lower bound
    BelowLower,
}

impl ZoneQuadrant {
    pub fn is_upper(&self) -> bool {
        matches!(
            self,
            ZoneQuadrant::AboveUpper | ZoneQuadrant::UpperOuter | ZoneQuadrant::UpperInner
        )
    }
}

impl fmt::Display for ZoneQuadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ZoneQuadrant::AboveUpper => "Q>2",
            ZoneQuadrant::UpperOuter => "Q2",
            ZoneQuadrant::UpperInner => "Q1",
            ZoneQuadrant::LowerInner => "Q-1",
            ZoneQuadrant::LowerOuter => "Q-2",
            ZoneQuadrant::BelowLower => "Q<-2",
        };
        write!(f, "{}", label)
    }
}

/// Quadrant boundary prices
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuadrantBoundaries {
    pub q2: f64,
    pub q1: f64,
    pub q_neg1: f64,
    pub q_neg2: f64,
}

/// One labelled rung of the ladder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneLevel {
    pub price: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneMap {
    pub reference_open: f64,
    pub pct: f64,
    pub upper_bound: f64,
    pub lower_bound: f64,
    /// Ascending, last element is `upper_bound`
    pub upper_levels: Vec<f64>,
    /// Descending, last element is `lower_bound`
    pub lower_levels: Vec<f64>,
    pub quadrants: QuadrantBoundaries,
}

impl ZoneMap {
    pub fn subdivisions(&self) -> usize {
        self.upper_levels.len()
    }

    /// Distance between adjacent levels
    pub fn spacing(&self) -> f64 {
        (self.upper_bound - self.reference_open) / self.subdivisions() as f64
    }

    /// Every level including the open, ascending
    pub fn boundaries(&self) -> Vec<ZoneLevel> {
        let n = self.subdivisions();
        let mut ladder = Vec::with_capacity(2 * n + 1);
        for (i, price) in self.lower_levels.iter().enumerate().rev() {
            ladder.push(ZoneLevel {
                price: *price,
                label: format!("S{}", i + 1),
            });
        }
        ladder.push(ZoneLevel {
            price: self.reference_open,
            label: "OPEN".to_string(),
        });
        for (i, price) in self.upper_levels.iter().enumerate() {
            ladder.push(ZoneLevel {
                price: *price,
                label: format!("R{}", i + 1),
            });
        }
        ladder
    }

    /// Levels within `tolerance_pct` of `price`
    pub fn boundaries_near(&self, price: f64, tolerance_pct: f64) -> Vec<ZoneLevel> {
        let tolerance = price * tolerance_pct;
        self.boundaries()
            .into_iter()
            .filter(|level| (level.price - price).abs() <= tolerance)
            .collect()
    }

    /// Nearest level strictly above `price`
    pub fn level_above(&self, price: f64) -> Option<ZoneLevel> {
        self.boundaries().into_iter().find(|level| level.price > price)
    }

    /// Nearest level strictly below `price`
    pub fn level_below(&self, price: f64) -> Option<ZoneLevel> {
        self.boundaries()
            .into_iter()
            .rev()
            .find(|level| level.price < price)
    }

    pub fn quadrant_of(&self, price: f64) -> ZoneQuadrant {
        let q = &self.quadrants;
        if price > q.q2 {
            ZoneQuadrant::AboveUpper
        } else if price > q.q1 {
            ZoneQuadrant::UpperOuter
        } else if price >= self.reference_open {
            ZoneQuadrant::UpperInner
        } else if price >= q.q_neg1 {
            ZoneQuadrant::LowerInner
        } else if price >= q.q_neg2 {
            ZoneQuadrant::LowerOuter
        } else {
            ZoneQuadrant::BelowLower
        }
    }
}

/// Zone map builder
#[derive(Debug, Clone, Default)]
pub struct ZoneEngine {
    config: ZoneConfig,
}

impl ZoneEngine {
    pub fn new(config: ZoneConfig) -> Self {
        Self { config }
    }

    /// Build with the configured subdivision count
    pub fn build_map(&self, reference_open: f64, pct: f64) -> EngineResult<ZoneMap> {
        Self::build(reference_open, pct, self.config.subdivisions)
    }

    pub fn build(reference_open: f64, pct: f64, subdivisions: usize) -> EngineResult<ZoneMap> {
        if !reference_open.is_finite() || reference_open <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "reference open must be positive, got {}",
                reference_open
            )));
        }
        if !pct.is_finite() || pct <= 0.0 || pct >= 1.0 {
            return Err(EngineError::InvalidInput(format!(
                "expected move must be in (0, 1), got {}",
                pct
            )));
        }
        if subdivisions == 0 {
            return Err(EngineError::InvalidInput(
                "subdivisions must be at least 1".to_string(),
            ));
        }

        let upper_bound = reference_open * (1.0 + pct);
        let lower_bound = reference_open * (1.0 - pct);
        let up_step = (upper_bound - reference_open) / subdivisions as f64;
        let down_step = (reference_open - lower_bound) / subdivisions as f64;

        let mut upper_levels: Vec<f64> = (1..=subdivisions)
            .map(|i| reference_open + up_step * i as f64)
            .collect();
        let mut lower_levels: Vec<f64> = (1..=subdivisions)
            .map(|i| reference_open - down_step * i as f64)
            .collect();
        // Pin the outermost rung to the bound exactly
        upper_levels[subdivisions - 1] = upper_bound;
        lower_levels[subdivisions - 1] = lower_bound;

        Ok(ZoneMap {
            reference_open,
            pct,
            upper_bound,
            lower_bound,
            upper_levels,
            lower_levels,
            quadrants: QuadrantBoundaries {
                q2: upper_bound,
                q1: reference_open * (1.0 + pct / 2.0),
                q_neg1: reference_open * (1.0 - pct / 2.0),
                q_neg2: lower_bound,
            },
        })
    }
}
