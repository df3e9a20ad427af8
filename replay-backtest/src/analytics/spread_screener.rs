//! Credit spread screening.
//!
//! Reference [`SignalEngine`]. For each chain snapshot it screens for:
//! - the best bull put spread (short put in the delta window)
//! - the best bear call spread (short call in the delta window)
//! - an iron condor combining the two when both exist
//!
//! and emits a warning notice when dealers are net short gamma.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::{OptionChainSnapshot, OptionType, SnapshotRow};
use crate::signals::{
    CandidateAlert, Leg, LegAction, SignalEngine, SignalError, Strategy, WARNING_MARKER,
};

use super::gex::GexMetrics;

/// Configuration for spread screening.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpreadScreenerConfig {
    /// Minimum delta for short strike (absolute value).
    pub min_short_delta: f64,
    /// Maximum delta for short strike (absolute value).
    pub max_short_delta: f64,
    /// Minimum open interest for liquidity.
    pub min_open_interest: i64,
    /// Minimum volume for liquidity.
    pub min_volume: i64,
    /// Maximum bid-ask spread as a fraction of mid.
    pub max_spread_pct: f64,
    /// Spread widths to consider (in strike points).
    pub spread_widths: Vec<Decimal>,
    /// Minimum credit as percentage of width.
    pub min_credit_pct: f64,
    /// Only trade contracts expiring on the snapshot's trading day.
    pub same_day_expiration_only: bool,
    /// Emit a warning notice when net GEX is negative.
    pub negative_gamma_warning: bool,
    /// Build iron condors from the best put and call spreads.
    pub iron_condors: bool,
}

impl Default for SpreadScreenerConfig {
    fn default() -> Self {
        Self {
            min_short_delta: 0.10,
            max_short_delta: 0.30,
            min_open_interest: 0,
            min_volume: 0,
            max_spread_pct: 0.50,
            spread_widths: vec![Decimal::from(5), Decimal::from(10)],
            min_credit_pct: 10.0,
            same_day_expiration_only: true,
            negative_gamma_warning: true,
            iron_condors: true,
        }
    }
}

/// A screened vertical credit spread.
#[derive(Debug, Clone)]
pub struct SpreadCandidate {
    pub option_type: OptionType,
    pub expiration: NaiveDate,
    pub short_strike: Decimal,
    pub long_strike: Decimal,
    /// Short strike delta (absolute value).
    pub short_delta: f64,
    /// Long strike delta (absolute value).
    pub long_delta: f64,
    /// Short strike bid price.
    pub short_bid: Decimal,
    /// Long strike ask price.
    pub long_ask: Decimal,
    /// Net credit (short bid - long ask).
    pub credit: Decimal,
    pub width: Decimal,
    /// Credit as percentage of width.
    pub credit_pct: f64,
    /// Maximum loss per share (width - credit).
    pub max_loss: Decimal,
    /// Expected value score used for ranking.
    pub ev_score: f64,
}

impl SpreadCandidate {
    /// Calculate return on risk if max profit achieved.
    pub fn return_on_risk(&self) -> f64 {
        let credit: f64 = self.credit.try_into().unwrap_or(0.0);
        let max_loss: f64 = self.max_loss.try_into().unwrap_or(1.0);
        if max_loss > 0.0 {
            credit / max_loss * 100.0
        } else {
            0.0
        }
    }

    /// Quality on a 0-100 scale: credit captured, weighted by the short
    /// strike's probability of finishing out of the money.
    pub fn quality_score(&self) -> f64 {
        let score = self.credit_pct * (1.0 - self.short_delta);
        (score.clamp(0.0, 100.0) * 10.0).round() / 10.0
    }

    fn legs(&self) -> [Leg; 2] {
        [
            Leg {
                action: LegAction::Sell,
                option_type: self.option_type,
                strike: self.short_strike,
                price: self.short_bid,
                delta: self.short_delta,
            },
            Leg {
                action: LegAction::Buy,
                option_type: self.option_type,
                strike: self.long_strike,
                price: self.long_ask,
                delta: self.long_delta,
            },
        ]
    }
}

/// Spread screener for finding credit spread candidates.
pub struct CreditSpreadScreener {
    config: SpreadScreenerConfig,
    warning_marker: String,
}

impl CreditSpreadScreener {
    pub fn new(config: SpreadScreenerConfig) -> Self {
        Self {
            config,
            warning_marker: WARNING_MARKER.to_string(),
        }
    }

    /// Tag notices with `marker` instead of the default. An empty marker
    /// turns notices off, since nothing could tell them apart from trades.
    pub fn with_warning_marker(mut self, marker: impl Into<String>) -> Self {
        self.warning_marker = marker.into();
        self
    }

    /// Screen for put credit spread candidates, best first.
    pub fn screen_put_spreads(
        &self,
        chain: &OptionChainSnapshot,
        day: NaiveDate,
    ) -> Vec<SpreadCandidate> {
        self.screen_side(chain, OptionType::Put, day)
    }

    /// Screen for call credit spread candidates, best first.
    pub fn screen_call_spreads(
        &self,
        chain: &OptionChainSnapshot,
        day: NaiveDate,
    ) -> Vec<SpreadCandidate> {
        self.screen_side(chain, OptionType::Call, day)
    }

    fn screen_side(
        &self,
        chain: &OptionChainSnapshot,
        option_type: OptionType,
        day: NaiveDate,
    ) -> Vec<SpreadCandidate> {
        let mut candidates = Vec::new();

        let quotes = match option_type {
            OptionType::Put => &chain.puts,
            OptionType::Call => &chain.calls,
        };
        let eligible: Vec<&SnapshotRow> = quotes
            .iter()
            .filter(|q| !self.config.same_day_expiration_only || q.expiration_date == day)
            .filter(|q| self.passes_liquidity_filter(q))
            .collect();

        let short_candidates = eligible.iter().filter(|q| {
            let delta = q.delta.abs();
            delta >= self.config.min_short_delta && delta <= self.config.max_short_delta
        });

        for short in short_candidates {
            for width in &self.config.spread_widths {
                // Long leg sits further out of the money.
                let long_strike = match option_type {
                    OptionType::Put => short.strike - *width,
                    OptionType::Call => short.strike + *width,
                };

                let long = match option_type {
                    OptionType::Put => chain.put_at_strike(long_strike, short.expiration_date),
                    OptionType::Call => chain.call_at_strike(long_strike, short.expiration_date),
                };
                let Some(long) = long.filter(|q| self.passes_liquidity_filter(q)) else {
                    continue;
                };

                let credit = short.bid - long.ask;
                if credit <= Decimal::ZERO || credit >= *width {
                    continue;
                }

                let credit_f64: f64 = credit.try_into().unwrap_or(0.0);
                let width_f64: f64 = (*width).try_into().unwrap_or(1.0);
                let credit_pct = credit_f64 / width_f64 * 100.0;

                if credit_pct < self.config.min_credit_pct {
                    continue;
                }

                let delta = short.delta.abs();
                let prob_otm = 1.0 - delta;
                let ev_score = credit_pct * prob_otm - (100.0 - credit_pct) * delta;

                candidates.push(SpreadCandidate {
                    option_type,
                    expiration: short.expiration_date,
                    short_strike: short.strike,
                    long_strike,
                    short_delta: delta,
                    long_delta: long.delta.abs(),
                    short_bid: short.bid,
                    long_ask: long.ask,
                    credit,
                    width: *width,
                    credit_pct,
                    max_loss: *width - credit,
                    ev_score,
                });
            }
        }

        // Sort by EV score descending
        candidates.sort_by(|a, b| b.ev_score.total_cmp(&a.ev_score));
        candidates
    }

    /// Check if a quote passes the liquidity filter.
    fn passes_liquidity_filter(&self, quote: &SnapshotRow) -> bool {
        quote.open_interest >= self.config.min_open_interest
            && quote.volume >= self.config.min_volume
            && quote.spread_pct() <= self.config.max_spread_pct
    }

    fn alert_id(
        symbol: &str,
        strategy: Strategy,
        chain: &OptionChainSnapshot,
        strikes: &str,
    ) -> String {
        format!(
            "{}-{}-{}-{}",
            symbol,
            strategy.as_str(),
            chain.timestamp.format("%Y%m%d%H%M%S"),
            strikes
        )
    }

    fn vertical_alert(
        symbol: &str,
        chain: &OptionChainSnapshot,
        strategy: Strategy,
        spread: &SpreadCandidate,
    ) -> CandidateAlert {
        CandidateAlert {
            id: Self::alert_id(symbol, strategy, chain, &spread.short_strike.to_string()),
            strategy,
            legs: spread.legs().to_vec(),
            net_credit: spread.credit,
            max_loss: spread.max_loss,
            max_profit: spread.credit,
            quality_score: spread.quality_score(),
        }
    }

    /// `None` when the combined credit covers the wider wing, which leaves
    /// no risk to stop out.
    fn condor_alert(
        symbol: &str,
        chain: &OptionChainSnapshot,
        put: &SpreadCandidate,
        call: &SpreadCandidate,
    ) -> Option<CandidateAlert> {
        let net_credit = put.credit + call.credit;
        // Only one side can finish in the money.
        let max_loss = put.width.max(call.width) - net_credit;
        if max_loss <= Decimal::ZERO {
            return None;
        }
        let [put_short, put_long] = put.legs();
        let [call_short, call_long] = call.legs();

        Some(CandidateAlert {
            id: Self::alert_id(
                symbol,
                Strategy::IronCondor,
                chain,
                &format!("{}-{}", put.short_strike, call.short_strike),
            ),
            strategy: Strategy::IronCondor,
            legs: vec![put_long, put_short, call_short, call_long],
            net_credit,
            max_loss,
            max_profit: net_credit,
            quality_score: ((put.quality_score() + call.quality_score()) / 2.0 * 10.0).round()
                / 10.0,
        })
    }

    fn negative_gamma_notice(
        &self,
        symbol: &str,
        chain: &OptionChainSnapshot,
        metrics: &GexMetrics,
    ) -> CandidateAlert {
        let mut id = format!(
            "{}-negative-gamma-{}-{}",
            self.warning_marker,
            symbol,
            chain.timestamp.format("%Y%m%d%H%M%S")
        );
        if let Some(flip) = metrics.gamma_flip {
            id.push_str(&format!("-flip{flip}"));
        }

        CandidateAlert {
            id,
            strategy: Strategy::IronCondor,
            legs: Vec::new(),
            net_credit: Decimal::ZERO,
            max_loss: Decimal::ZERO,
            max_profit: Decimal::ZERO,
            quality_score: 0.0,
        }
    }
}

impl SignalEngine for CreditSpreadScreener {
    fn generate(
        &self,
        symbol: &str,
        metrics: &GexMetrics,
        chain: &OptionChainSnapshot,
        day: NaiveDate,
    ) -> Result<Vec<CandidateAlert>, SignalError> {
        if chain.underlying_price <= Decimal::ZERO {
            return Err(SignalError::InvalidChain(format!(
                "{} @ {} has no underlying price",
                symbol, chain.timestamp
            )));
        }

        let mut alerts = Vec::new();

        if self.config.negative_gamma_warning
            && !self.warning_marker.is_empty()
            && metrics.is_negative_gamma()
        {
            alerts.push(self.negative_gamma_notice(symbol, chain, metrics));
        }

        let puts = self.screen_put_spreads(chain, day);
        let calls = self.screen_call_spreads(chain, day);

        if let Some(put) = puts.first() {
            alerts.push(Self::vertical_alert(symbol, chain, Strategy::BullPutSpread, put));
        }
        if let Some(call) = calls.first() {
            alerts.push(Self::vertical_alert(symbol, chain, Strategy::BearCallSpread, call));
        }
        if self.config.iron_condors {
            if let (Some(put), Some(call)) = (puts.first(), calls.first()) {
                if put.expiration == call.expiration {
                    alerts.extend(Self::condor_alert(symbol, chain, put, call));
                }
            }
        }

        Ok(alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use rust_decimal_macros::dec;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn quote(
        strike: Decimal,
        option_type: OptionType,
        bid: Decimal,
        ask: Decimal,
        delta: f64,
    ) -> SnapshotRow {
        SnapshotRow {
            symbol: "SPX".to_string(),
            snapshot_time: ts(),
            strike,
            option_type,
            bid,
            ask,
            last: bid,
            volume: 100,
            open_interest: 1000,
            delta,
            gamma: 0.01,
            theta: -1.0,
            vega: 0.5,
            expiration_date: ts().date(),
        }
    }

    fn sample_chain() -> OptionChainSnapshot {
        OptionChainSnapshot {
            symbol: "SPX".to_string(),
            timestamp: ts(),
            underlying_price: dec!(6020),
            calls: vec![
                quote(dec!(6040), OptionType::Call, dec!(3.0), dec!(3.2), 0.25),
                quote(dec!(6045), OptionType::Call, dec!(1.6), dec!(1.8), 0.18),
                quote(dec!(6050), OptionType::Call, dec!(0.9), dec!(1.0), 0.12),
            ],
            puts: vec![
                quote(dec!(5990), OptionType::Put, dec!(0.9), dec!(1.0), -0.12),
                quote(dec!(5995), OptionType::Put, dec!(1.5), dec!(1.7), -0.17),
                quote(dec!(6000), OptionType::Put, dec!(2.9), dec!(3.1), -0.22),
            ],
        }
    }

    #[test]
    fn test_default_config() {
        let config = SpreadScreenerConfig::default();
        assert_eq!(config.min_short_delta, 0.10);
        assert_eq!(config.max_short_delta, 0.30);
        assert_eq!(config.spread_widths, vec![dec!(5), dec!(10)]);
        assert!(config.same_day_expiration_only);
    }

    #[test]
    fn test_put_spread_economics() {
        let screener = CreditSpreadScreener::new(SpreadScreenerConfig::default());
        let chain = sample_chain();
        let puts = screener.screen_put_spreads(&chain, ts().date());

        let best = puts.first().unwrap();
        assert_eq!(best.short_strike, dec!(6000));
        assert_eq!(best.long_strike, dec!(5995));
        // 2.9 bid - 1.7 ask
        assert_eq!(best.credit, dec!(1.2));
        assert_eq!(best.max_loss, dec!(3.8));
        assert!(best.return_on_risk() > 31.0 && best.return_on_risk() < 32.0);
    }

    #[test]
    fn test_generate_emits_verticals_and_condor() {
        let screener = CreditSpreadScreener::new(SpreadScreenerConfig::default());
        let chain = sample_chain();
        let metrics = GexMetrics::from_chain(&chain);
        let alerts = screener
            .generate("SPX", &metrics, &chain, ts().date())
            .unwrap();

        let strategies: Vec<_> = alerts.iter().map(|a| a.strategy).collect();
        assert!(strategies.contains(&Strategy::BullPutSpread));
        assert!(strategies.contains(&Strategy::BearCallSpread));
        assert!(strategies.contains(&Strategy::IronCondor));

        let put = alerts
            .iter()
            .find(|a| a.strategy == Strategy::BullPutSpread)
            .unwrap();
        assert_eq!(put.short_strike(), Some(dec!(6000)));
        assert_eq!(put.max_profit, put.net_credit);
        assert!(alerts.iter().all(|a| !a.is_warning(WARNING_MARKER)));

        let condor = alerts
            .iter()
            .find(|a| a.strategy == Strategy::IronCondor)
            .unwrap();
        assert_eq!(condor.legs.len(), 4);
        assert_eq!(condor.short_strike(), Some(dec!(6000)));
    }

    #[test]
    fn test_expiration_filter() {
        let screener = CreditSpreadScreener::new(SpreadScreenerConfig::default());
        let chain = sample_chain();
        let next_day = ts().date().succ_opt().unwrap();
        assert!(screener.screen_put_spreads(&chain, next_day).is_empty());
    }

    #[test]
    fn test_negative_gamma_notice() {
        let screener = CreditSpreadScreener::new(SpreadScreenerConfig::default());
        let chain = sample_chain();
        let metrics = GexMetrics {
            net_gex: -1.0,
            ..GexMetrics::default()
        };
        let alerts = screener
            .generate("SPX", &metrics, &chain, ts().date())
            .unwrap();
        assert!(alerts[0].is_warning(WARNING_MARKER));
        assert!(alerts[0].legs.is_empty());
    }

    #[test]
    fn test_notice_uses_configured_marker() {
        let chain = sample_chain();
        let metrics = GexMetrics {
            net_gex: -1.0,
            ..GexMetrics::default()
        };

        let screener = CreditSpreadScreener::new(SpreadScreenerConfig::default())
            .with_warning_marker("notice");
        let alerts = screener
            .generate("SPX", &metrics, &chain, ts().date())
            .unwrap();
        assert!(alerts[0].is_warning("notice"));
        assert!(!alerts[0].is_warning(WARNING_MARKER));

        let silent = CreditSpreadScreener::new(SpreadScreenerConfig::default())
            .with_warning_marker("");
        let alerts = silent
            .generate("SPX", &metrics, &chain, ts().date())
            .unwrap();
        assert!(alerts.iter().all(|a| !a.legs.is_empty()));
    }

    #[test]
    fn test_condor_skipped_when_credit_covers_width() {
        // 3.0 credit on each 5-wide side: 6.0 combined exceeds the wing.
        let chain = OptionChainSnapshot {
            calls: vec![
                quote(dec!(6040), OptionType::Call, dec!(4.0), dec!(4.2), 0.25),
                quote(dec!(6045), OptionType::Call, dec!(0.9), dec!(1.0), 0.08),
            ],
            puts: vec![
                quote(dec!(5995), OptionType::Put, dec!(0.9), dec!(1.0), -0.08),
                quote(dec!(6000), OptionType::Put, dec!(4.0), dec!(4.2), -0.25),
            ],
            ..sample_chain()
        };
        let screener = CreditSpreadScreener::new(SpreadScreenerConfig::default());
        let metrics = GexMetrics::from_chain(&chain);
        let alerts = screener
            .generate("SPX", &metrics, &chain, ts().date())
            .unwrap();

        let strategies: Vec<_> = alerts.iter().map(|a| a.strategy).collect();
        assert!(strategies.contains(&Strategy::BullPutSpread));
        assert!(strategies.contains(&Strategy::BearCallSpread));
        assert!(!strategies.contains(&Strategy::IronCondor));
        assert!(alerts
            .iter()
            .filter(|a| !a.legs.is_empty())
            .all(|a| a.max_loss > Decimal::ZERO));
    }

    #[test]
    fn test_illiquid_long_leg_rejected() {
        let mut chain = sample_chain();
        for put in chain.puts.iter_mut().filter(|p| p.strike == dec!(5995)) {
            put.ask = dec!(5.0);
        }
        let screener = CreditSpreadScreener::new(SpreadScreenerConfig::default());
        let puts = screener.screen_put_spreads(&chain, ts().date());
        assert!(puts.iter().all(|p| p.long_strike != dec!(5995)));
    }
}
