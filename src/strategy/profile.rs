//! Volume Profile
//!
//! Volume-by-price histogram built from recent intraday candles. Each
//! candle's volume is spread evenly over the price buckets its high/low range
//! spans. A price is a high-volume node (likely to hold) when its bucket sits
//! at or above the upper percentile of populated buckets, a low-volume node
//! (likely to break) at or below the lower percentile.

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, OrderStatistics};
use std::fmt;

use crate::domain::{Candle, EngineError, EngineResult};
use crate::strategy::params::ProfileConfig;

/// Refuse to allocate absurd histograms
const MAX_BUCKETS: i64 = 200_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeNode {
    Hvn,
    Lvn,
    Neutral,
}

impl fmt::Display for VolumeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumeNode::Hvn => write!(f, "HVN"),
            VolumeNode::Lvn => write!(f, "LVN"),
            VolumeNode::Neutral => write!(f, "neutral"),
        }
    }
}

/// Profile context at one price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileReading {
    pub node: VolumeNode,
    /// Distance of the bucket volume from the median, normalised to [0, 1]
    pub confidence: f64,
    /// Centre of the bucket used for the classification
    pub node_price: f64,
    pub bucket_volume: f64,
    /// Centre of the highest-volume bucket
    pub point_of_control: f64,
    pub vwap: f64,
}

impl ProfileReading {
    /// Reading used when no profile could be built
    pub fn neutral(price: f64) -> Self {
        Self {
            node: VolumeNode::Neutral,
            confidence: 0.0,
            node_price: price,
            bucket_volume: 0.0,
            point_of_control: price,
            vwap: price,
        }
    }
}

/// Volume histogram over contiguous price buckets
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeProfile {
    bucket_size: f64,
    /// Index of the first bucket (bucket i covers [i, i+1) * bucket_size)
    first_index: i64,
    volumes: Vec<f64>,
    vwap: f64,
}

impl VolumeProfile {
    pub fn build(candles: &[Candle], bucket_size: f64) -> EngineResult<Self> {
        if !bucket_size.is_finite() || bucket_size <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "bucket size must be positive, got {}",
                bucket_size
            )));
        }
        let valid: Vec<&Candle> = candles.iter().filter(|c| c.is_valid()).collect();
        if valid.is_empty() {
            return Err(EngineError::InsufficientData {
                required: 1,
                available: 0,
            });
        }

        let index = |price: f64| (price / bucket_size).floor() as i64;
        let first_index = valid.iter().map(|c| index(c.low)).min().unwrap_or(0);
        let last_index = valid.iter().map(|c| index(c.high)).max().unwrap_or(0);
        if last_index - first_index >= MAX_BUCKETS {
            return Err(EngineError::InvalidInput(format!(
                "bucket size {} yields more than {} buckets",
                bucket_size, MAX_BUCKETS
            )));
        }

        let mut volumes = vec![0.0; (last_index - first_index + 1) as usize];
        let mut notional = 0.0;
        let mut total_volume = 0.0;
        for candle in &valid {
            let lo = index(candle.low);
            let hi = index(candle.high);
            let share = candle.volume / (hi - lo + 1) as f64;
            for i in lo..=hi {
                volumes[(i - first_index) as usize] += share;
            }
            let typical = (candle.high + candle.low + candle.close) / 3.0;
            notional += typical * candle.volume;
            total_volume += candle.volume;
        }

        let vwap = if total_volume > 0.0 {
            notional / total_volume
        } else {
            valid[valid.len() - 1].close
        };

        Ok(Self {
            bucket_size,
            first_index,
            volumes,
            vwap,
        })
    }

    pub fn vwap(&self) -> f64 {
        self.vwap
    }

    pub fn bucket_count(&self) -> usize {
        self.volumes.len()
    }

    pub fn bucket_center(&self, index: i64) -> f64 {
        (index as f64 + 0.5) * self.bucket_size
    }

    pub fn bucket_index(&self, price: f64) -> i64 {
        (price / self.bucket_size).floor() as i64
    }

    /// Volume in the bucket at `index`, `None` outside the profile span
    pub fn volume_at(&self, index: i64) -> Option<f64> {
        let offset = index - self.first_index;
        if offset < 0 {
            return None;
        }
        self.volumes.get(offset as usize).copied()
    }

    pub fn contains(&self, index: i64) -> bool {
        self.volume_at(index).is_some()
    }

    /// Centre of the max-volume bucket; lowest price wins ties
    pub fn point_of_control(&self) -> f64 {
        let (offset, _) = self
            .volumes
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |best, (i, v)| if *v > best.1 { (i, *v) } else { best });
        self.bucket_center(self.first_index + offset as i64)
    }

    /// Volumes of buckets that traded at all
    pub fn populated_volumes(&self) -> Vec<f64> {
        self.volumes.iter().copied().filter(|v| *v > 0.0).collect()
    }

    /// Populated bucket nearest to `index` within `radius` buckets.
    /// The exact bucket wins, then the closer one, then the higher price.
    pub fn nearest_populated(&self, index: i64, radius: i64) -> Option<i64> {
        (0..=radius)
            .flat_map(|d| [index + d, index - d])
            .find(|i| self.volume_at(*i).is_some_and(|v| v > 0.0))
    }
}

/// Classifies prices against a volume profile
#[derive(Debug, Clone, Default)]
pub struct ProfileClassifier {
    config: ProfileConfig,
}

impl ProfileClassifier {
    pub fn new(config: ProfileConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProfileConfig {
        &self.config
    }

    /// Classify `price` using buckets sized relative to it
    pub fn classify(&self, candles: &[Candle], price: f64) -> EngineResult<ProfileReading> {
        if !price.is_finite() || price <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "profile target price must be positive, got {}",
                price
            )));
        }
        let profile = VolumeProfile::build(candles, price * self.config.bucket_size_pct)?;
        Ok(self.classify_with(&profile, price))
    }

    pub fn classify_with(&self, profile: &VolumeProfile, price: f64) -> ProfileReading {
        let point_of_control = profile.point_of_control();
        let vwap = profile.vwap();
        let target = profile.bucket_index(price);
        let radius = ((price * self.config.tolerance_pct) / profile.bucket_size).ceil() as i64;

        let (index, volume) = match profile.nearest_populated(target, radius) {
            Some(i) => (i, profile.volume_at(i).unwrap_or(0.0)),
            // Untraded gap inside the profile
            None if profile.contains(target) => (target, 0.0),
            None => {
                return ProfileReading {
                    point_of_control,
                    vwap,
                    ..ProfileReading::neutral(price)
                };
            }
        };

        let populated = profile.populated_volumes();
        let max = populated.iter().copied().fold(f64::MIN, f64::max);
        let min = populated.iter().copied().fold(f64::MAX, f64::min);
        let mut data = Data::new(populated);
        let high = data.quantile(self.config.hvn_percentile / 100.0);
        let low = data.quantile(self.config.lvn_percentile / 100.0);
        let median = data.median();

        let node = if high - low <= f64::EPSILON && volume > 0.0 {
            VolumeNode::Neutral
        } else if volume >= high {
            VolumeNode::Hvn
        } else if volume <= low {
            VolumeNode::Lvn
        } else {
            VolumeNode::Neutral
        };

        let confidence = if volume >= median {
            normalised(volume - median, max - median)
        } else {
            normalised(median - volume, median - min)
        };

        ProfileReading {
            node,
            confidence,
            node_price: profile.bucket_center(index),
            bucket_volume: volume,
            point_of_control,
            vwap,
        }
    }
}

fn normalised(distance: f64, span: f64) -> f64 {
    if span <= f64::EPSILON {
        // Nothing to compare against: an empty bucket is as thin as it gets
        return if distance > 0.0 { 1.0 } else { 0.0 };
    }
    (distance / span).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn candle(i: i64, low: f64, high: f64, volume: f64) -> Candle {
        let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::minutes(i);
        Candle::new(ts, low, high, low, high, volume)
    }

    /// Heavy trade at 100-101, light at 103-104, nothing at 102
    fn create_test_candles() -> Vec<Candle> {
        let mut candles = Vec::new();
        for i in 0..10 {
            candles.push(candle(i, 100.0, 100.9, 1_000.0));
        }
        for i in 10..12 {
            candles.push(candle(i, 101.0, 101.9, 400.0));
        }
        for i in 12..14 {
            candles.push(candle(i, 103.0, 103.9, 20.0));
        }
        candles
    }

    fn classifier() -> ProfileClassifier {
        ProfileClassifier::new(ProfileConfig {
            tolerance_pct: 0.0,
            ..ProfileConfig::default()
        })
    }

    /// Unit buckets: 100 → 10_000, 101 → 800, 102 → 0, 103 → 40
    fn create_test_profile() -> VolumeProfile {
        VolumeProfile::build(&create_test_candles(), 1.0).unwrap()
    }

    #[test]
    fn test_volume_spread_across_buckets() {
        let candles = vec![candle(0, 10.0, 12.9, 300.0)];
        let profile = VolumeProfile::build(&candles, 1.0).unwrap();
        assert_eq!(profile.bucket_count(), 3);
        for i in 10..=12 {
            assert_relative_eq!(profile.volume_at(i).unwrap(), 100.0);
        }
        assert!(profile.volume_at(13).is_none());
    }

    #[test]
    fn test_point_of_control_and_vwap() {
        let profile = create_test_profile();
        assert_relative_eq!(profile.point_of_control(), 100.5);
        assert!(profile.vwap() > 100.0 && profile.vwap() < 101.0);
    }

    #[test]
    fn test_hvn_classification() {
        let reading = classifier().classify_with(&create_test_profile(), 100.4);
        assert_eq!(reading.node, VolumeNode::Hvn);
        assert_relative_eq!(reading.node_price, 100.5, epsilon = 1e-9);
        assert!(reading.confidence > 0.0);
    }

    #[test]
    fn test_lvn_classification() {
        let reading = classifier().classify_with(&create_test_profile(), 103.5);
        assert_eq!(reading.node, VolumeNode::Lvn);
        assert_relative_eq!(reading.confidence, 1.0);
    }

    #[test]
    fn test_untraded_gap_is_lvn() {
        let reading = classifier().classify_with(&create_test_profile(), 102.5);
        assert_eq!(reading.node, VolumeNode::Lvn);
        assert_eq!(reading.bucket_volume, 0.0);
    }

    #[test]
    fn test_outside_profile_is_neutral() {
        let reading = classifier().classify_with(&create_test_profile(), 150.0);
        assert_eq!(reading.node, VolumeNode::Neutral);
        assert_eq!(reading.confidence, 0.0);
        assert_relative_eq!(reading.point_of_control, 100.5);
    }

    #[test]
    fn test_nearest_bucket_within_tolerance() {
        let profile = create_test_profile();
        // 102 is empty; 101 and 103 are both one bucket away, higher price wins
        assert_eq!(profile.nearest_populated(102, 1), Some(103));
        assert_eq!(profile.nearest_populated(102, 0), None);
        assert_eq!(profile.nearest_populated(100, 3), Some(100));
    }

    #[test]
    fn test_classify_sizes_buckets_from_price() {
        let reading = classifier().classify(&create_test_candles(), 100.4).unwrap();
        assert_eq!(reading.node, VolumeNode::Hvn);
        assert!((reading.node_price - 100.4).abs() < 0.2);
    }

    #[test]
    fn test_invalid_input() {
        assert!(matches!(
            classifier().classify(&[], 100.0),
            Err(EngineError::InsufficientData { .. })
        ));
        assert!(matches!(
            classifier().classify(&create_test_candles(), -1.0),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(VolumeProfile::build(&create_test_candles(), 0.0).is_err());
    }
}
