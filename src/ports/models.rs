//! Common data structures exchanged with the order-book collaborator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side crossed the spread on an executed trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggressor {
    Buy,
    Sell,
}

/// Resting liquidity at one price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

impl BookLevel {
    pub fn new(price: f64, size: f64) -> Self {
        Self { price, size }
    }

    pub fn notional(&self) -> f64 {
        self.price * self.size
    }
}

/// One depth snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub timestamp: DateTime<Utc>,
    /// Best bid first
    pub bids: Vec<BookLevel>,
    /// Best ask first
    pub asks: Vec<BookLevel>,
}

/// Executed trade from the tape
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TapeTrade {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub size: f64,
    pub aggressor: Aggressor,
}

impl TapeTrade {
    pub fn notional(&self) -> f64 {
        self.price * self.size
    }
}

/// Everything observed for an instrument across one sampling window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSample {
    pub snapshots: Vec<BookSnapshot>,
    pub trades: Vec<TapeTrade>,
}

impl OrderBookSample {
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty() && self.trades.is_empty()
    }

    /// Most recent depth snapshot, if any
    pub fn latest(&self) -> Option<&BookSnapshot> {
        self.snapshots.iter().max_by_key(|s| s.timestamp)
    }
}

// Serialization formats
//
// Timestamps are serialized as ISO 8601 strings in UTC.
// Enums use snake_case naming convention in serialization.
