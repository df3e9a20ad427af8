//! Performance aggregation over evaluated trades.
//!
//! A running fold: totals depend only on the set of trades recorded, not on
//! the order they arrive in.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::outcome::{EvaluatedTrade, TradeResult};
use crate::signals::Strategy;

/// Per-strategy tallies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyStats {
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub pnl: Decimal,
}

/// Running win/loss counters and P&L for one symbol run.
#[derive(Debug, Clone, Default)]
pub struct PerformanceAggregator {
    trades: usize,
    wins: usize,
    losses: usize,
    open: usize,
    total_pnl: Decimal,
    gross_profit: Decimal,
    gross_loss: Decimal,
    largest_winner: Decimal,
    largest_loser: Decimal,
    by_strategy: BTreeMap<Strategy, StrategyStats>,
}

impl PerformanceAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_trades<'a, I>(trades: I) -> Self
    where
        I: IntoIterator<Item = &'a EvaluatedTrade>,
    {
        trades.into_iter().fold(Self::new(), |mut agg, trade| {
            agg.record(trade);
            agg
        })
    }

    pub fn record(&mut self, trade: &EvaluatedTrade) {
        self.trades += 1;
        self.total_pnl += trade.pnl;

        let stats = self.by_strategy.entry(trade.strategy()).or_default();
        stats.trades += 1;
        stats.pnl += trade.pnl;

        match trade.result {
            TradeResult::Win => {
                self.wins += 1;
                stats.wins += 1;
                self.gross_profit += trade.pnl;
                self.largest_winner = self.largest_winner.max(trade.pnl);
            }
            TradeResult::Loss => {
                self.losses += 1;
                stats.losses += 1;
                self.gross_loss += trade.pnl;
                self.largest_loser = self.largest_loser.min(trade.pnl);
            }
            TradeResult::Open => self.open += 1,
        }
    }

    pub fn total_trades(&self) -> usize {
        self.trades
    }

    pub fn wins(&self) -> usize {
        self.wins
    }

    pub fn losses(&self) -> usize {
        self.losses
    }

    pub fn open(&self) -> usize {
        self.open
    }

    pub fn closed(&self) -> usize {
        self.wins + self.losses
    }

    pub fn total_pnl(&self) -> Decimal {
        self.total_pnl
    }

    pub fn gross_profit(&self) -> Decimal {
        self.gross_profit
    }

    /// Sum of losing P&L (zero or negative).
    pub fn gross_loss(&self) -> Decimal {
        self.gross_loss
    }

    /// Win rate in percent; zero when nothing closed.
    pub fn win_rate(&self) -> Decimal {
        let closed = self.closed();
        if closed == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.wins as u64) * Decimal::ONE_HUNDRED / Decimal::from(closed as u64)
    }

    /// Gross profit over absolute gross loss. `None` without any losses.
    pub fn profit_factor(&self) -> Option<f64> {
        if self.gross_loss.is_zero() {
            return None;
        }
        let profit: f64 = self.gross_profit.try_into().unwrap_or(0.0);
        let loss: f64 = self.gross_loss.abs().try_into().unwrap_or(0.0);
        Some(profit / loss)
    }

    pub fn avg_winner(&self) -> Decimal {
        if self.wins == 0 {
            return Decimal::ZERO;
        }
        self.gross_profit / Decimal::from(self.wins as u64)
    }

    pub fn avg_loser(&self) -> Decimal {
        if self.losses == 0 {
            return Decimal::ZERO;
        }
        self.gross_loss / Decimal::from(self.losses as u64)
    }

    pub fn largest_winner(&self) -> Decimal {
        self.largest_winner
    }

    pub fn largest_loser(&self) -> Decimal {
        self.largest_loser
    }

    pub fn by_strategy(&self) -> &BTreeMap<Strategy, StrategyStats> {
        &self.by_strategy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::CandidateAlert;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn trade(strategy: Strategy, result: TradeResult, pnl: Decimal) -> EvaluatedTrade {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        EvaluatedTrade {
            alert: CandidateAlert {
                id: "t".to_string(),
                strategy,
                legs: Vec::new(),
                net_credit: dec!(2.3),
                max_loss: dec!(2.7),
                max_profit: dec!(2.3),
                quality_score: 50.0,
            },
            entry_time: ts,
            entry_price: dec!(6020),
            short_strike: Some(dec!(6000)),
            result,
            exit_price: dec!(6020),
            exit_time: ts,
            pnl,
        }
    }

    #[test]
    fn test_empty_run() {
        let agg = PerformanceAggregator::new();
        assert_eq!(agg.total_trades(), 0);
        assert_eq!(agg.win_rate(), Decimal::ZERO);
        assert_eq!(agg.total_pnl(), Decimal::ZERO);
        assert_eq!(agg.profit_factor(), None);
    }

    #[test]
    fn test_counts_and_pnl() {
        let trades = vec![
            trade(Strategy::BullPutSpread, TradeResult::Win, dec!(230)),
            trade(Strategy::BullPutSpread, TradeResult::Loss, dec!(-270)),
            trade(Strategy::BearCallSpread, TradeResult::Win, dec!(150)),
            trade(Strategy::IronCondor, TradeResult::Open, Decimal::ZERO),
        ];
        let agg = PerformanceAggregator::from_trades(&trades);

        assert_eq!(agg.total_trades(), 4);
        assert_eq!(agg.wins(), 2);
        assert_eq!(agg.losses(), 1);
        assert_eq!(agg.open(), 1);
        assert_eq!(agg.total_pnl(), dec!(110));
        assert_eq!(agg.gross_profit(), dec!(380));
        assert_eq!(agg.gross_loss(), dec!(-270));
        assert_eq!(agg.avg_winner(), dec!(190));
        assert_eq!(agg.largest_winner(), dec!(230));
        assert_eq!(agg.largest_loser(), dec!(-270));
        assert_eq!(agg.win_rate().round_dp(2), dec!(66.67));

        let puts = &agg.by_strategy()[&Strategy::BullPutSpread];
        assert_eq!(puts.trades, 2);
        assert_eq!(puts.pnl, dec!(-40));
        assert_eq!(agg.by_strategy()[&Strategy::IronCondor].wins, 0);
    }

    #[test]
    fn test_open_trades_do_not_move_win_rate() {
        let trades = vec![
            trade(Strategy::BullPutSpread, TradeResult::Win, dec!(230)),
            trade(Strategy::BullPutSpread, TradeResult::Open, Decimal::ZERO),
            trade(Strategy::BullPutSpread, TradeResult::Open, Decimal::ZERO),
        ];
        let agg = PerformanceAggregator::from_trades(&trades);
        assert_eq!(agg.win_rate(), dec!(100));
    }

    #[test]
    fn test_order_independent() {
        let mut trades = vec![
            trade(Strategy::BullPutSpread, TradeResult::Win, dec!(230)),
            trade(Strategy::BearCallSpread, TradeResult::Loss, dec!(-350)),
            trade(Strategy::BullPutSpread, TradeResult::Win, dec!(120)),
        ];
        let forward = PerformanceAggregator::from_trades(&trades);
        trades.reverse();
        let backward = PerformanceAggregator::from_trades(&trades);

        assert_eq!(forward.total_pnl(), backward.total_pnl());
        assert_eq!(forward.win_rate(), backward.win_rate());
        assert_eq!(forward.by_strategy(), backward.by_strategy());
        assert_eq!(forward.profit_factor(), backward.profit_factor());
    }
}
