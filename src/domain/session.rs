//! Session Context
//!
//! One instance per instrument per session. The opening range is accumulated
//! while the opening window is open; `session_bias` is write-once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::signal::TradeSide;

/// Directional bias, used both for the session and for order-flow readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    Long,
    Short,
    Neutral,
}

impl Bias {
    /// Does this bias agree with the given trade side
    pub fn aligns_with(&self, side: TradeSide) -> bool {
        matches!(
            (self, side),
            (Bias::Long, TradeSide::Long) | (Bias::Short, TradeSide::Short)
        )
    }

    /// Does this bias point against the given trade side
    pub fn opposes(&self, side: TradeSide) -> bool {
        matches!(
            (self, side),
            (Bias::Long, TradeSide::Short) | (Bias::Short, TradeSide::Long)
        )
    }
}

impl From<TradeSide> for Bias {
    fn from(side: TradeSide) -> Self {
        match side {
            TradeSide::Long => Bias::Long,
            TradeSide::Short => Bias::Short,
        }
    }
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bias::Long => write!(f, "long"),
            Bias::Short => write!(f, "short"),
            Bias::Neutral => write!(f, "neutral"),
        }
    }
}

/// Where the session sits in the opening-range lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Inside the opening window, range still accumulating
    Collecting,
    /// Range established, waiting for a confirmed breakout
    Watching,
    /// Bias set by a confirmed breakout
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_start: DateTime<Utc>,
    pub opening_range_high: Option<f64>,
    pub opening_range_low: Option<f64>,
    pub phase: SessionPhase,
    session_bias: Bias,
}

impl SessionContext {
    pub fn new(session_start: DateTime<Utc>) -> Self {
        Self {
            session_start,
            opening_range_high: None,
            opening_range_low: None,
            phase: SessionPhase::Collecting,
            session_bias: Bias::Neutral,
        }
    }

    pub fn session_bias(&self) -> Bias {
        self.session_bias
    }

    pub fn is_collecting(&self) -> bool {
        self.phase == SessionPhase::Collecting
    }

    /// Set the bias once. Returns false if the session was already resolved.
    pub fn resolve_bias(&mut self, bias: Bias) -> bool {
        if self.phase == SessionPhase::Resolved || bias == Bias::Neutral {
            return false;
        }
        self.session_bias = bias;
        self.phase = SessionPhase::Resolved;
        true
    }

    /// Opening range as (low, high) once both ends are known
    pub fn opening_range(&self) -> Option<(f64, f64)> {
        match (self.opening_range_low, self.opening_range_high) {
            (Some(low), Some(high)) => Some((low, high)),
            _ => None,
        }
    }
}
