//! Gamma exposure (GEX) metrics.
//!
//! Dealer gamma exposure per strike, assuming dealers are long calls and
//! short puts:
//! - Call GEX: gamma * open_interest * 100 * spot^2 * 0.01
//! - Put GEX: the same magnitude, negated
//!
//! Values are dollars of delta change per 1% move in the underlying.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::{OptionChainSnapshot, SnapshotRow};

const CONTRACT_SIZE: f64 = 100.0;

/// Exposure aggregated at one strike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrikeExposure {
    pub strike: Decimal,
    pub call_gex: f64,
    pub put_gex: f64,
}

impl StrikeExposure {
    pub fn net(&self) -> f64 {
        self.call_gex + self.put_gex
    }
}

/// Chain-wide gamma exposure summary handed to the signal engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GexMetrics {
    pub spot: f64,
    pub net_gex: f64,
    pub call_gex: f64,
    pub put_gex: f64,
    /// Strike with the largest call exposure.
    pub call_wall: Option<Decimal>,
    /// Strike with the largest absolute put exposure.
    pub put_wall: Option<Decimal>,
    /// First strike (ascending) where cumulative net exposure changes sign.
    pub gamma_flip: Option<Decimal>,
    /// Per-strike exposure, ascending by strike.
    pub strikes: Vec<StrikeExposure>,
}

fn row_gex(row: &SnapshotRow, spot: f64) -> f64 {
    row.gamma * row.open_interest as f64 * CONTRACT_SIZE * spot * spot * 0.01
}

impl GexMetrics {
    /// Compute exposure for every strike in the chain.
    pub fn from_chain(chain: &OptionChainSnapshot) -> Self {
        let spot: f64 = chain.underlying_price.try_into().unwrap_or(0.0);

        let mut by_strike: BTreeMap<Decimal, StrikeExposure> = BTreeMap::new();
        for call in &chain.calls {
            by_strike
                .entry(call.strike)
                .or_insert_with(|| StrikeExposure {
                    strike: call.strike,
                    call_gex: 0.0,
                    put_gex: 0.0,
                })
                .call_gex += row_gex(call, spot);
        }
        for put in &chain.puts {
            by_strike
                .entry(put.strike)
                .or_insert_with(|| StrikeExposure {
                    strike: put.strike,
                    call_gex: 0.0,
                    put_gex: 0.0,
                })
                .put_gex -= row_gex(put, spot);
        }

        let strikes: Vec<StrikeExposure> = by_strike.into_values().collect();

        let call_gex: f64 = strikes.iter().map(|s| s.call_gex).sum();
        let put_gex: f64 = strikes.iter().map(|s| s.put_gex).sum();

        let call_wall = strikes
            .iter()
            .filter(|s| s.call_gex > 0.0)
            .max_by(|a, b| a.call_gex.total_cmp(&b.call_gex))
            .map(|s| s.strike);
        let put_wall = strikes
            .iter()
            .filter(|s| s.put_gex < 0.0)
            .max_by(|a, b| a.put_gex.abs().total_cmp(&b.put_gex.abs()))
            .map(|s| s.strike);

        Self {
            spot,
            net_gex: call_gex + put_gex,
            call_gex,
            put_gex,
            call_wall,
            put_wall,
            gamma_flip: gamma_flip(&strikes),
            strikes,
        }
    }

    /// Dealers net short gamma: hedging amplifies moves.
    pub fn is_negative_gamma(&self) -> bool {
        self.net_gex < 0.0
    }
}

fn gamma_flip(strikes: &[StrikeExposure]) -> Option<Decimal> {
    let mut cumulative = 0.0;
    for exposure in strikes {
        let next = cumulative + exposure.net();
        if cumulative != 0.0 && next != 0.0 && cumulative.signum() != next.signum() {
            return Some(exposure.strike);
        }
        cumulative = next;
    }
    None
}
