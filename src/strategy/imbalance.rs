//! Imbalance Detector
//!
//! Scans candles for short-lived price inefficiencies:
//! - Fair-value gaps: the low of candle i+2 above the high of candle i
//!   (bullish) or its high below the low of candle i (bearish)
//! - Volume voids: runs of consecutive candles trading below a fraction of
//!   the trailing average volume
//!
//! Each imbalance is tagged with the zone quadrant of its midpoint. An
//! imbalance is stale once a later candle closes beyond its far edge by more
//! than the invalidation margin.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::domain::{Candle, TradeSide};
use crate::strategy::params::ImbalanceConfig;
use crate::strategy::zone_engine::{ZoneMap, ZoneQuadrant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    /// Trade side that follows the imbalance
    pub fn side(&self) -> TradeSide {
        match self {
            Direction::Bullish => TradeSide::Long,
            Direction::Bearish => TradeSide::Short,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Bullish => write!(f, "bullish"),
            Direction::Bearish => write!(f, "bearish"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImbalanceKind {
    FairValueGap,
    VolumeVoid,
}

impl fmt::Display for ImbalanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImbalanceKind::FairValueGap => write!(f, "FVG"),
            ImbalanceKind::VolumeVoid => write!(f, "volume void"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Imbalance {
    pub kind: ImbalanceKind,
    pub direction: Direction,
    pub upper_boundary: f64,
    pub lower_boundary: f64,
    pub midpoint: f64,
    /// 0..1, gap relative to the middle candle or thinness of the void
    pub strength: f64,
    pub zone_quadrant: ZoneQuadrant,
    /// Timestamp of the candle that completed the pattern
    pub created_at: DateTime<Utc>,
}

impl Imbalance {
    pub fn contains(&self, price: f64) -> bool {
        price >= self.lower_boundary && price <= self.upper_boundary
    }

    /// Closed beyond the far edge by more than `margin` (fraction)
    pub fn is_invalidated_by(&self, close: f64, margin: f64) -> bool {
        match self.direction {
            Direction::Bullish => close < self.lower_boundary * (1.0 - margin),
            Direction::Bearish => close > self.upper_boundary * (1.0 + margin),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImbalanceDetector {
    config: ImbalanceConfig,
}

impl ImbalanceDetector {
    pub fn new(config: ImbalanceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ImbalanceConfig {
        &self.config
    }

    /// All gaps and voids in `candles`, ordered by completion time
    pub fn detect(&self, candles: &[Candle], zones: &ZoneMap) -> Vec<Imbalance> {
        let mut found = self.fair_value_gaps(candles, zones);
        found.extend(self.volume_voids(candles, zones));
        found.sort_by_key(|imbalance| imbalance.created_at);
        found
    }

    pub fn fair_value_gaps(&self, candles: &[Candle], zones: &ZoneMap) -> Vec<Imbalance> {
        candles
            .windows(3)
            .filter_map(|w| {
                let (first, middle, last) = (&w[0], &w[1], &w[2]);
                let (direction, lower, upper) = if last.low > first.high {
                    (Direction::Bullish, first.high, last.low)
                } else if last.high < first.low {
                    (Direction::Bearish, last.high, first.low)
                } else {
                    return None;
                };

                let gap = upper - lower;
                let midpoint = (upper + lower) / 2.0;
                if gap < midpoint * self.config.min_gap_pct {
                    return None;
                }
                let strength = if middle.range() > 0.0 {
                    (gap / middle.range()).clamp(0.0, 1.0)
                } else {
                    1.0
                };

                Some(Imbalance {
                    kind: ImbalanceKind::FairValueGap,
                    direction,
                    upper_boundary: upper,
                    lower_boundary: lower,
                    midpoint,
                    strength,
                    zone_quadrant: zones.quadrant_of(midpoint),
                    created_at: last.timestamp,
                })
            })
            .collect()
    }

    pub fn volume_voids(&self, candles: &[Candle], zones: &ZoneMap) -> Vec<Imbalance> {
        let window = self.config.void_average_window;
        let thin: Vec<Option<f64>> = candles
            .iter()
            .enumerate()
            .map(|(i, candle)| {
                let history = &candles[i.saturating_sub(window)..i];
                if history.is_empty() {
                    return None;
                }
                let average = history.iter().map(|c| c.volume).sum::<f64>() / history.len() as f64;
                (average > 0.0 && candle.volume < average * self.config.void_volume_fraction)
                    .then_some(candle.volume / average)
            })
            .collect();

        let mut voids = Vec::new();
        let mut start = 0;
        while start < candles.len() {
            if thin[start].is_none() {
                start += 1;
                continue;
            }
            let mut end = start;
            while end + 1 < candles.len() && thin[end + 1].is_some() {
                end += 1;
            }
            let run_len = end - start + 1;
            if run_len >= self.config.void_min_run {
                voids.push(self.void_from_run(&candles[start..=end], &thin[start..=end], zones));
            }
            start = end + 1;
        }
        voids
    }

    fn void_from_run(&self, run: &[Candle], ratios: &[Option<f64>], zones: &ZoneMap) -> Imbalance {
        let lower = run.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        let upper = run.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let midpoint = (upper + lower) / 2.0;
        let mean_ratio = ratios.iter().flatten().sum::<f64>() / ratios.len() as f64;
        let first = &run[0];
        let last = &run[run.len() - 1];
        let direction = if last.close >= first.open {
            Direction::Bullish
        } else {
            Direction::Bearish
        };

        Imbalance {
            kind: ImbalanceKind::VolumeVoid,
            direction,
            upper_boundary: upper,
            lower_boundary: lower,
            midpoint,
            strength: (1.0 - mean_ratio).clamp(0.0, 1.0),
            zone_quadrant: zones.quadrant_of(midpoint),
            created_at: last.timestamp,
        }
    }

    /// Whether any candle after the imbalance closed through it
    pub fn is_stale(&self, imbalance: &Imbalance, candles: &[Candle]) -> bool {
        candles
            .iter()
            .filter(|c| c.timestamp > imbalance.created_at)
            .any(|c| imbalance.is_invalidated_by(c.close, self.config.invalidation_margin_pct))
    }
}

/// Live imbalances for one session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImbalanceBook {
    imbalances: Vec<Imbalance>,
}

impl ImbalanceBook {
    /// Detect over the session's candles and drop everything already stale
    pub fn refresh(detector: &ImbalanceDetector, candles: &[Candle], zones: &ZoneMap) -> Self {
        let detected = detector.detect(candles, zones);
        let total = detected.len();
        let imbalances: Vec<Imbalance> = detected
            .into_iter()
            .filter(|imbalance| !detector.is_stale(imbalance, candles))
            .collect();
        debug!(detected = total, live = imbalances.len(), "Imbalance book refreshed");
        Self { imbalances }
    }

    pub fn from_imbalances(imbalances: Vec<Imbalance>) -> Self {
        Self { imbalances }
    }

    /// Remove entries invalidated by `close`
    pub fn prune(&mut self, close: f64, margin: f64) {
        self.imbalances
            .retain(|imbalance| !imbalance.is_invalidated_by(close, margin));
    }

    pub fn live(&self) -> &[Imbalance] {
        &self.imbalances
    }

    pub fn len(&self) -> usize {
        self.imbalances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.imbalances.is_empty()
    }
}
