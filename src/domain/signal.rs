use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::session::Bias;
use crate::strategy::imbalance::Imbalance;
use crate::strategy::order_flow::OrderFlowReading;
use crate::strategy::profile::ProfileReading;
use crate::strategy::zone_engine::ZoneQuadrant;

/// Setup family that produced a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetupType {
    Orb,
    ZoneBreakout,
    ZoneRejection,
    ImbalanceRetest,
    ImbalanceContinuation,
}

impl SetupType {
    /// Setups that trade through a level rather than off it
    pub fn is_breakout_style(&self) -> bool {
        matches!(
            self,
            SetupType::Orb | SetupType::ZoneBreakout | SetupType::ImbalanceContinuation
        )
    }

    pub fn is_rejection_style(&self) -> bool {
        !self.is_breakout_style()
    }
}

impl fmt::Display for SetupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SetupType::Orb => "ORB",
            SetupType::ZoneBreakout => "ZONE_BREAKOUT",
            SetupType::ZoneRejection => "ZONE_REJECTION",
            SetupType::ImbalanceRetest => "IMBALANCE_RETEST",
            SetupType::ImbalanceContinuation => "IMBALANCE_CONTINUATION",
        };
        write!(f, "{}", name)
    }
}

/// Direction of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSide {
    Long,
    Short,
}

impl TradeSide {
    pub fn opposite(&self) -> Self {
        match self {
            TradeSide::Long => TradeSide::Short,
            TradeSide::Short => TradeSide::Long,
        }
    }

    /// +1 for long, -1 for short
    pub fn sign(&self) -> f64 {
        match self {
            TradeSide::Long => 1.0,
            TradeSide::Short => -1.0,
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Long => write!(f, "LONG"),
            TradeSide::Short => write!(f, "SHORT"),
        }
    }
}

/// Zone level a signal was taken against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneInfo {
    pub level_price: f64,
    pub level_label: String,
    pub quadrant: ZoneQuadrant,
}

/// Everything the engine looked at when it accepted a candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalContext {
    pub session_bias: Bias,
    pub profile: ProfileReading,
    pub order_flow: OrderFlowReading,
    pub zone: ZoneInfo,
    pub imbalance: Option<Imbalance>,
    pub reason: String,
}

/// Trade signal emitted by one evaluation tick. Never mutated after emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub instrument: String,
    pub timestamp: DateTime<Utc>,
    pub setup_type: SetupType,
    pub side: TradeSide,
    pub entry: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub confidence: f64,
    pub context: SignalContext,
}

impl Signal {
    /// Validates the signal meets basic criteria
    pub fn validate(&self) -> Result<(), String> {
        if self.confidence.is_nan() || self.confidence < 0.0 || self.confidence > 1.0 {
            return Err(format!("Invalid confidence value: {}", self.confidence));
        }

        if !(self.entry.is_finite() && self.take_profit.is_finite() && self.stop_loss.is_finite()) {
            return Err("Levels must be finite".to_string());
        }

        let (tp_ok, sl_ok) = match self.side {
            TradeSide::Long => (self.take_profit > self.entry, self.stop_loss < self.entry),
            TradeSide::Short => (self.take_profit < self.entry, self.stop_loss > self.entry),
        };
        if !tp_ok {
            return Err(format!(
                "Take profit {} on wrong side of entry {} for {}",
                self.take_profit, self.entry, self.side
            ));
        }
        if !sl_ok {
            return Err(format!(
                "Stop loss {} on wrong side of entry {} for {}",
                self.stop_loss, self.entry, self.side
            ));
        }

        Ok(())
    }

    /// Reward-to-risk ratio of the emitted levels
    pub fn reward_risk(&self) -> f64 {
        let risk = (self.entry - self.stop_loss).abs();
        if risk <= f64::EPSILON {
            return 0.0;
        }
        (self.take_profit - self.entry).abs() / risk
    }
}
