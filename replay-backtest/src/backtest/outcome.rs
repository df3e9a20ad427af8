//! Trade outcome evaluation.
//!
//! Each candidate alert is scored by walking forward from its entry
//! snapshot through the rest of the same trading day:
//! - a stop breach (price through the short strike) is an immediate, final LOSS
//! - reaching the day's last snapshot unbreached marks a WIN, which a later
//!   same-day breach may still overwrite
//! - no same-day snapshot after entry leaves the trade OPEN
//!
//! P&L is per contract: credit or max loss times the 100-share multiplier.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::{OptionType, PricePoint};
use crate::signals::{CandidateAlert, Strategy};

/// Shares per option contract.
pub const CONTRACT_MULTIPLIER: Decimal = Decimal::ONE_HUNDRED;

/// Resolution of an evaluated trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeResult {
    Open,
    Win,
    Loss,
}

/// Price level(s) at which a credit spread is stopped out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRule {
    /// Put side: breached when price <= strike.
    Below(Decimal),
    /// Call side: breached when price >= strike.
    Above(Decimal),
    /// Both sides: breached below the put strike or above the call strike.
    Outside { put: Decimal, call: Decimal },
}

impl StopRule {
    /// Derive the stop from the alert's sold legs.
    ///
    /// Returns `None` when the alert has no SELL leg.
    pub fn for_alert(alert: &CandidateAlert) -> Option<Self> {
        let short = alert.short_strike()?;
        let rule = match alert.strategy {
            Strategy::BullPutSpread => Self::Below(short),
            Strategy::BearCallSpread => Self::Above(short),
            Strategy::IronCondor => {
                let put = alert.short_leg_of(OptionType::Put).map(|l| l.strike);
                let call = alert.short_leg_of(OptionType::Call).map(|l| l.strike);
                match (put, call) {
                    (Some(put), Some(call)) => Self::Outside { put, call },
                    (Some(put), None) => Self::Below(put),
                    (None, Some(call)) => Self::Above(call),
                    (None, None) => Self::Below(short),
                }
            }
        };
        Some(rule)
    }

    pub fn is_breached(&self, price: Decimal) -> bool {
        match *self {
            Self::Below(strike) => price <= strike,
            Self::Above(strike) => price >= strike,
            Self::Outside { put, call } => price <= put || price >= call,
        }
    }
}

/// Whether the forward scan should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanControl {
    Continue,
    Stop,
}

/// Per-trade state machine: OPEN -> WIN | LOSS.
#[derive(Debug, Clone)]
pub struct OutcomeTracker {
    stop: StopRule,
    result: TradeResult,
    exit_price: Decimal,
    exit_time: NaiveDateTime,
}

impl OutcomeTracker {
    /// Start tracking at the entry snapshot.
    pub fn new(stop: StopRule, entry: PricePoint) -> Self {
        Self {
            stop,
            result: TradeResult::Open,
            exit_price: entry.price,
            exit_time: entry.timestamp,
        }
    }

    /// Feed the next same-day snapshot.
    pub fn observe(&mut self, tick: &PricePoint, last_of_day: bool) -> ScanControl {
        if self.result == TradeResult::Loss {
            return ScanControl::Stop;
        }

        if self.stop.is_breached(tick.price) {
            self.close(TradeResult::Loss, tick);
            return ScanControl::Stop;
        }

        if last_of_day {
            // Provisional: a later same-day breach still turns this into a loss.
            self.close(TradeResult::Win, tick);
        }
        ScanControl::Continue
    }

    fn close(&mut self, result: TradeResult, tick: &PricePoint) {
        self.result = result;
        self.exit_price = tick.price;
        self.exit_time = tick.timestamp;
    }

    pub fn result(&self) -> TradeResult {
        self.result
    }

    pub fn exit_price(&self) -> Decimal {
        self.exit_price
    }

    pub fn exit_time(&self) -> NaiveDateTime {
        self.exit_time
    }
}

/// A candidate alert with its resolved outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatedTrade {
    #[serde(flatten)]
    pub alert: CandidateAlert,
    pub entry_time: NaiveDateTime,
    pub entry_price: Decimal,
    /// Strike of the first SELL leg; `None` marks an unscoreable alert.
    pub short_strike: Option<Decimal>,
    pub result: TradeResult,
    pub exit_price: Decimal,
    pub exit_time: NaiveDateTime,
    pub pnl: Decimal,
}

impl EvaluatedTrade {
    pub fn is_scoreable(&self) -> bool {
        self.short_strike.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.result != TradeResult::Open
    }

    pub fn strategy(&self) -> Strategy {
        self.alert.strategy
    }

    pub fn net_credit(&self) -> Decimal {
        self.alert.net_credit
    }

    pub fn quality_score(&self) -> f64 {
        self.alert.quality_score
    }
}

/// Realized P&L for one contract of `alert` resolved as `result`.
pub fn realized_pnl(result: TradeResult, alert: &CandidateAlert) -> Decimal {
    match result {
        TradeResult::Win => alert.net_credit * CONTRACT_MULTIPLIER,
        TradeResult::Loss => -alert.max_loss * CONTRACT_MULTIPLIER,
        TradeResult::Open => Decimal::ZERO,
    }
}

/// Whether `timeline[idx]` is the final snapshot of its trading day.
fn is_last_of_day(timeline: &[PricePoint], idx: usize) -> bool {
    match timeline.get(idx + 1) {
        Some(next) => next.trading_day() != timeline[idx].trading_day(),
        None => true,
    }
}

/// Score `alert` entered at `timeline[entry_index]`.
///
/// `timeline` is the symbol's full priced snapshot sequence in ascending
/// time order. Returns `None` if `entry_index` is out of range.
pub fn evaluate(
    alert: CandidateAlert,
    timeline: &[PricePoint],
    entry_index: usize,
) -> Option<EvaluatedTrade> {
    let entry = *timeline.get(entry_index)?;
    let short_strike = alert.short_strike();

    let Some(stop) = StopRule::for_alert(&alert) else {
        return Some(EvaluatedTrade {
            alert,
            entry_time: entry.timestamp,
            entry_price: entry.price,
            short_strike,
            result: TradeResult::Open,
            exit_price: entry.price,
            exit_time: entry.timestamp,
            pnl: Decimal::ZERO,
        });
    };

    let mut tracker = OutcomeTracker::new(stop, entry);
    let entry_day = entry.trading_day();

    for j in (entry_index + 1)..timeline.len() {
        let tick = &timeline[j];
        if tick.trading_day() != entry_day {
            break;
        }
        if tracker.observe(tick, is_last_of_day(timeline, j)) == ScanControl::Stop {
            break;
        }
    }

    let result = tracker.result();
    Some(EvaluatedTrade {
        pnl: realized_pnl(result, &alert),
        alert,
        entry_time: entry.timestamp,
        entry_price: entry.price,
        short_strike,
        result,
        exit_price: tracker.exit_price(),
        exit_time: tracker.exit_time(),
    })
}
