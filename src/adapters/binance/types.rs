//! Binance REST Payloads
//!
//! Wire types for the public spot endpoints. Prices and quantities arrive as
//! decimal strings and are parsed on conversion.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::domain::Candle;
use crate::ports::{Aggressor, BookLevel, BookSnapshot, MarketDataError, TapeTrade};

/// One `/api/v3/klines` row:
/// `[open_time, open, high, low, close, volume, close_time, quote_volume,
///   trades, taker_buy_base, taker_buy_quote, ignore]`
#[derive(Debug, Clone, Deserialize)]
pub struct RawKline(
    pub i64,
    pub String,
    pub String,
    pub String,
    pub String,
    pub String,
    pub i64,
    pub String,
    pub u64,
    pub String,
    pub String,
    pub String,
);

impl RawKline {
    pub fn into_candle(self) -> Result<Candle, MarketDataError> {
        Ok(Candle::new(
            millis_to_utc(self.0)?,
            parse_decimal(&self.1, "open")?,
            parse_decimal(&self.2, "high")?,
            parse_decimal(&self.3, "low")?,
            parse_decimal(&self.4, "close")?,
            parse_decimal(&self.5, "volume")?,
        ))
    }
}

/// `/api/v3/depth` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthResponse {
    pub last_update_id: u64,
    /// `[price, quantity]`, best bid first
    pub bids: Vec<(String, String)>,
    /// `[price, quantity]`, best ask first
    pub asks: Vec<(String, String)>,
}

impl DepthResponse {
    pub fn into_snapshot(self, timestamp: DateTime<Utc>) -> Result<BookSnapshot, MarketDataError> {
        Ok(BookSnapshot {
            timestamp,
            bids: parse_levels(&self.bids)?,
            asks: parse_levels(&self.asks)?,
        })
    }
}

/// `/api/v3/aggTrades` row
#[derive(Debug, Clone, Deserialize)]
pub struct AggTrade {
    #[serde(rename = "a")]
    pub id: u64,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "T")]
    pub time: i64,
    /// Buyer was the maker, so the seller crossed the spread
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

impl AggTrade {
    pub fn into_tape_trade(self) -> Result<TapeTrade, MarketDataError> {
        Ok(TapeTrade {
            timestamp: millis_to_utc(self.time)?,
            price: parse_decimal(&self.price, "price")?,
            size: parse_decimal(&self.quantity, "quantity")?,
            aggressor: if self.buyer_is_maker {
                Aggressor::Sell
            } else {
                Aggressor::Buy
            },
        })
    }
}

/// Error body returned with non-2xx statuses
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}

fn parse_levels(raw: &[(String, String)]) -> Result<Vec<BookLevel>, MarketDataError> {
    raw.iter()
        .map(|(price, size)| {
            Ok(BookLevel::new(
                parse_decimal(price, "price")?,
                parse_decimal(size, "quantity")?,
            ))
        })
        .collect()
}

fn parse_decimal(raw: &str, field: &str) -> Result<f64, MarketDataError> {
    let value: f64 = raw
        .parse()
        .map_err(|_| MarketDataError::ParseError(format!("{} '{}' is not a number", field, raw)))?;
    if !value.is_finite() {
        return Err(MarketDataError::ParseError(format!("{} '{}' is not finite", field, raw)));
    }
    Ok(value)
}

fn millis_to_utc(millis: i64) -> Result<DateTime<Utc>, MarketDataError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| MarketDataError::ParseError(format!("timestamp {} out of range", millis)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kline_row_parses() {
        let body = r#"[[1709251200000,"61000.10","61500.00","60800.00","61234.56","1234.5",
            1709251259999,"75000000.0",5000,"600.0","36000000.0","0"]]"#;
        let rows: Vec<RawKline> = serde_json::from_str(body).unwrap();
        let candle = rows.into_iter().next().unwrap().into_candle().unwrap();

        assert_eq!(candle.timestamp, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(candle.open, 61000.10);
        assert_eq!(candle.close, 61234.56);
        assert_eq!(candle.volume, 1234.5);
        assert!(candle.is_valid());
    }

    #[test]
    fn test_depth_parses_best_first() {
        let body = r#"{"lastUpdateId":42,"bids":[["100.5","2.0"],["100.4","1.0"]],"asks":[["100.6","3.0"]]}"#;
        let depth: DepthResponse = serde_json::from_str(body).unwrap();
        assert_eq!(depth.last_update_id, 42);

        let snapshot = depth.into_snapshot(Utc::now()).unwrap();
        assert_eq!(snapshot.bids[0], BookLevel::new(100.5, 2.0));
        assert_eq!(snapshot.asks.len(), 1);
    }

    #[test]
    fn test_agg_trade_aggressor_side() {
        let body = r#"[{"a":1,"p":"100.0","q":"0.5","f":1,"l":1,"T":1709251200000,"m":true,"M":true},
                       {"a":2,"p":"100.1","q":"0.2","f":2,"l":2,"T":1709251200100,"m":false,"M":true}]"#;
        let trades: Vec<AggTrade> = serde_json::from_str(body).unwrap();
        let tape: Vec<TapeTrade> = trades
            .into_iter()
            .map(|t| t.into_tape_trade().unwrap())
            .collect();

        assert_eq!(tape[0].aggressor, Aggressor::Sell);
        assert_eq!(tape[1].aggressor, Aggressor::Buy);
        assert_eq!(tape[1].size, 0.2);
    }

    #[test]
    fn test_bad_decimal_rejected() {
        let depth = DepthResponse {
            last_update_id: 1,
            bids: vec![("abc".to_string(), "1".to_string())],
            asks: vec![],
        };
        let err = depth.into_snapshot(Utc::now()).unwrap_err();
        assert!(matches!(err, MarketDataError::ParseError(_)));
    }
}
