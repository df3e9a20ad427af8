//! Core data types for snapshot replay.
//!
//! These types represent recorded options-chain quotes and the per-timestamp
//! chain snapshots rebuilt from them. Everything here is immutable once
//! constructed; the replay never edits history.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// Option type (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionType {
    #[serde(rename = "CALL", alias = "C", alias = "call", alias = "Call")]
    Call,
    #[serde(rename = "PUT", alias = "P", alias = "put", alias = "Put")]
    Put,
}

impl OptionType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "C" | "CALL" => Some(Self::Call),
            "P" | "PUT" => Some(Self::Put),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "CALL",
            Self::Put => "PUT",
        }
    }
}

/// Parse a recorded snapshot timestamp.
///
/// Accepts RFC 3339 (the wall-clock time as written is kept, the offset is
/// dropped) and naive ISO-8601 with either `T` or a space as separator, at
/// second or finer precision.
pub fn parse_snapshot_time(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

fn deserialize_snapshot_time<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_snapshot_time(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid snapshot_time: {raw}")))
}

/// A single recorded option quote at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    /// Underlying symbol (e.g., "SPX")
    pub symbol: String,

    /// Capture time of the snapshot this quote belongs to
    #[serde(deserialize_with = "deserialize_snapshot_time")]
    pub snapshot_time: NaiveDateTime,

    /// Strike price
    pub strike: Decimal,

    /// Option type (call or put)
    #[serde(rename = "type")]
    pub option_type: OptionType,

    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,

    /// Trading volume
    pub volume: i64,

    /// Open interest
    pub open_interest: i64,

    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,

    /// Option expiration date
    pub expiration_date: NaiveDate,
}

impl SnapshotRow {
    /// Mid price between bid and ask.
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Calculate bid-ask spread as a fraction of mid.
    pub fn spread_pct(&self) -> f64 {
        let mid = self.mid();
        if mid.is_zero() {
            return 0.0;
        }
        ((self.ask - self.bid) / mid).try_into().unwrap_or(0.0)
    }

    /// Check that the quote is internally consistent.
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.trim().is_empty() {
            return Err("empty symbol".to_string());
        }
        if self.strike <= Decimal::ZERO {
            return Err(format!("non-positive strike {}", self.strike));
        }
        if self.bid.is_sign_negative()
            || self.ask.is_sign_negative()
            || self.last.is_sign_negative()
        {
            return Err(format!(
                "negative price at strike {} (bid {}, ask {}, last {})",
                self.strike, self.bid, self.ask, self.last
            ));
        }
        if self.volume < 0 || self.open_interest < 0 {
            return Err(format!(
                "negative volume/open interest at strike {}",
                self.strike
            ));
        }
        Ok(())
    }
}

/// One distinct capture timestamp with the underlying price recorded at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPoint {
    pub timestamp: NaiveDateTime,
    pub underlying_price: Option<Decimal>,
}

impl SnapshotPoint {
    pub fn new(timestamp: NaiveDateTime, underlying_price: Option<Decimal>) -> Self {
        Self {
            timestamp,
            underlying_price,
        }
    }

    /// Trading day this snapshot belongs to.
    pub fn trading_day(&self) -> NaiveDate {
        self.timestamp.date()
    }

    /// The snapshot as a price tick, if it carries a usable (positive) price.
    pub fn priced(&self) -> Option<PricePoint> {
        self.underlying_price
            .filter(|p| *p > Decimal::ZERO)
            .map(|price| PricePoint {
                timestamp: self.timestamp,
                price,
            })
    }
}

/// A snapshot timestamp paired with a known underlying price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricePoint {
    pub timestamp: NaiveDateTime,
    pub price: Decimal,
}

impl PricePoint {
    pub fn trading_day(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// The complete options chain for one symbol at one timestamp.
///
/// Calls and puts are each ordered by strike, then expiration.
#[derive(Debug, Clone)]
pub struct OptionChainSnapshot {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub underlying_price: Decimal,
    pub calls: Vec<SnapshotRow>,
    pub puts: Vec<SnapshotRow>,
}

impl OptionChainSnapshot {
    pub fn trading_day(&self) -> NaiveDate {
        self.timestamp.date()
    }

    /// Get all strikes available in this chain.
    pub fn strikes(&self) -> Vec<Decimal> {
        let mut strikes: Vec<_> = self
            .calls
            .iter()
            .chain(self.puts.iter())
            .map(|q| q.strike)
            .collect();
        strikes.sort();
        strikes.dedup();
        strikes
    }

    /// Find a call at a specific strike and expiration.
    pub fn call_at_strike(&self, strike: Decimal, expiration: NaiveDate) -> Option<&SnapshotRow> {
        self.calls
            .iter()
            .find(|q| q.strike == strike && q.expiration_date == expiration)
    }

    /// Find a put at a specific strike and expiration.
    pub fn put_at_strike(&self, strike: Decimal, expiration: NaiveDate) -> Option<&SnapshotRow> {
        self.puts
            .iter()
            .find(|q| q.strike == strike && q.expiration_date == expiration)
    }
}
