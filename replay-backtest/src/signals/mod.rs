//! Candidate alerts and the signal-engine seam.
//!
//! A [`SignalEngine`] turns one chain snapshot into zero or more
//! [`CandidateAlert`]s. The replay treats it as a black box, so any
//! implementation (the bundled screener, a scripted fixture) can drive it.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analytics::GexMetrics;
use crate::data::{OptionChainSnapshot, OptionType};

/// Marker carried in the id of informational notices that are not trades.
pub const WARNING_MARKER: &str = "warning";

/// Spread strategy proposed by an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    /// Vertical put credit spread.
    BullPutSpread,
    /// Vertical call credit spread.
    BearCallSpread,
    /// Put credit spread plus call credit spread.
    IronCondor,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BullPutSpread => "BULL_PUT_SPREAD",
            Self::BearCallSpread => "BEAR_CALL_SPREAD",
            Self::IronCondor => "IRON_CONDOR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LegAction {
    Buy,
    Sell,
}

/// One option leg of a proposed spread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leg {
    pub action: LegAction,
    pub option_type: OptionType,
    pub strike: Decimal,
    /// Per-share fill price assumed at entry.
    pub price: Decimal,
    pub delta: f64,
}

impl Leg {
    pub fn is_short(&self) -> bool {
        self.action == LegAction::Sell
    }
}

/// A proposed multi-leg spread with its entry economics.
///
/// Credit, loss and profit are per share; P&L scales them by the contract
/// multiplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateAlert {
    pub id: String,
    pub strategy: Strategy,
    pub legs: Vec<Leg>,
    pub net_credit: Decimal,
    pub max_loss: Decimal,
    pub max_profit: Decimal,
    pub quality_score: f64,
}

impl CandidateAlert {
    /// First leg sold, if any.
    pub fn short_leg(&self) -> Option<&Leg> {
        self.legs.iter().find(|leg| leg.is_short())
    }

    /// Strike of the first leg sold.
    pub fn short_strike(&self) -> Option<Decimal> {
        self.short_leg().map(|leg| leg.strike)
    }

    /// First leg sold of the given option type.
    pub fn short_leg_of(&self, option_type: OptionType) -> Option<&Leg> {
        self.legs
            .iter()
            .find(|leg| leg.is_short() && leg.option_type == option_type)
    }

    /// Whether this alert is an informational notice rather than a trade.
    pub fn is_warning(&self, marker: &str) -> bool {
        !marker.is_empty() && self.id.contains(marker)
    }
}

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("Invalid chain: {0}")]
    InvalidChain(String),

    #[error("Signal engine failed: {0}")]
    Engine(String),
}

/// Source of candidate alerts for one chain snapshot.
pub trait SignalEngine {
    fn generate(
        &self,
        symbol: &str,
        metrics: &GexMetrics,
        chain: &OptionChainSnapshot,
        day: NaiveDate,
    ) -> Result<Vec<CandidateAlert>, SignalError>;
}

impl<S: SignalEngine + ?Sized> SignalEngine for Box<S> {
    fn generate(
        &self,
        symbol: &str,
        metrics: &GexMetrics,
        chain: &OptionChainSnapshot,
        day: NaiveDate,
    ) -> Result<Vec<CandidateAlert>, SignalError> {
        (**self).generate(symbol, metrics, chain, day)
    }
}
