//! Backtest report assembly and persistence.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use thiserror::Error;

use super::aggregator::{PerformanceAggregator, StrategyStats};
use super::outcome::EvaluatedTrade;
use crate::signals::Strategy;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn percent<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_percent(*value))
}

fn currency<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_currency(*value))
}

/// `66.666…` -> `"66.67%"`, `0` -> `"0%"`.
pub fn format_percent(value: Decimal) -> String {
    format!("{}%", value.round_dp(2).normalize())
}

/// `230` -> `"$230.00"`, `-270` -> `"$-270.00"`.
pub fn format_currency(value: Decimal) -> String {
    format!("${:.2}", value)
}

/// Headline numbers; field names and string formats are consumed downstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub symbol: String,
    pub total_snapshots: usize,
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    #[serde(serialize_with = "percent")]
    pub win_rate: Decimal,
    #[serde(rename = "totalPnL", serialize_with = "currency")]
    pub total_pnl: Decimal,
}

/// Bookkeeping from the replay loop that the aggregator never sees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayCounters {
    /// Timestamps dropped for missing rows or price.
    pub skipped_snapshots: usize,
    /// Alerts returned by the signal engine, warnings excluded.
    pub candidate_alerts: usize,
    pub warnings: usize,
    /// Alerts without a SELL leg.
    pub unscoreable: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStatistics {
    pub open_trades: usize,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub profit_factor: Option<f64>,
    pub avg_winner: Decimal,
    pub avg_loser: Decimal,
    pub largest_winner: Decimal,
    pub largest_loser: Decimal,
    pub skipped_snapshots: usize,
    pub candidate_alerts: usize,
    pub warnings_filtered: usize,
    pub unscoreable_alerts: usize,
    pub by_strategy: BTreeMap<Strategy, StrategyStats>,
}

/// Full output of one symbol run.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub summary: ReportSummary,
    pub statistics: ReportStatistics,
    pub signals: Vec<EvaluatedTrade>,
}

impl BacktestReport {
    pub fn build(
        symbol: &str,
        total_snapshots: usize,
        counters: ReplayCounters,
        aggregate: &PerformanceAggregator,
        signals: Vec<EvaluatedTrade>,
    ) -> Self {
        let summary = ReportSummary {
            symbol: symbol.to_string(),
            total_snapshots,
            total_trades: signals.len(),
            wins: aggregate.wins(),
            losses: aggregate.losses(),
            win_rate: aggregate.win_rate(),
            total_pnl: aggregate.total_pnl(),
        };

        let statistics = ReportStatistics {
            open_trades: aggregate.open(),
            gross_profit: aggregate.gross_profit(),
            gross_loss: aggregate.gross_loss(),
            profit_factor: aggregate.profit_factor(),
            avg_winner: aggregate.avg_winner(),
            avg_loser: aggregate.avg_loser(),
            largest_winner: aggregate.largest_winner(),
            largest_loser: aggregate.largest_loser(),
            skipped_snapshots: counters.skipped_snapshots,
            candidate_alerts: counters.candidate_alerts,
            warnings_filtered: counters.warnings,
            unscoreable_alerts: counters.unscoreable,
            by_strategy: aggregate.by_strategy().clone(),
        };

        Self {
            summary,
            statistics,
            signals,
        }
    }

    /// Human-readable summary for the terminal.
    pub fn summary_text(&self) -> String {
        let s = &self.summary;
        let st = &self.statistics;
        let profit_factor = st
            .profit_factor
            .map(|pf| format!("{:.2}", pf))
            .unwrap_or_else(|| "n/a".to_string());

        let mut text = format!(
            "Backtest Results: {}\n\
             ----------------------------------------\n\
             Snapshots: {} ({} skipped)\n\
             Trades: {} (W: {}, L: {}, Open: {})\n\
             Win Rate: {}\n\
             Total P&L: {}\n\
             Profit Factor: {}\n\
             Avg Winner: ${:.2}\n\
             Avg Loser: ${:.2}\n\
             Largest Win: ${:.2}\n\
             Largest Loss: ${:.2}",
            s.symbol,
            s.total_snapshots,
            st.skipped_snapshots,
            s.total_trades,
            s.wins,
            s.losses,
            st.open_trades,
            format_percent(s.win_rate),
            format_currency(s.total_pnl),
            profit_factor,
            st.avg_winner,
            st.avg_loser,
            st.largest_winner,
            st.largest_loser,
        );

        for (strategy, stats) in &st.by_strategy {
            text.push_str(&format!(
                "\n  {:<18} {:>4} trades  W {:>3}  L {:>3}  {}",
                strategy.as_str(),
                stats.trades,
                stats.wins,
                stats.losses,
                format_currency(stats.pnl)
            ));
        }
        text
    }
}

/// Sink for finished reports.
pub trait ReportWriter {
    /// Persist `report`, returning where it landed.
    fn write(&self, report: &BacktestReport) -> Result<PathBuf, ReportError>;
}

/// Writes `backtest_<SYMBOL>_<yyyymmdd_HHMMSS>.json` into a directory.
#[derive(Debug, Clone)]
pub struct JsonReportWriter {
    output_dir: PathBuf,
}

impl JsonReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn file_name(symbol: &str, at: DateTime<Utc>) -> String {
        format!("backtest_{}_{}.json", symbol, at.format("%Y%m%d_%H%M%S"))
    }

    fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ReportError + '_ {
        move |source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl ReportWriter for JsonReportWriter {
    fn write(&self, report: &BacktestReport) -> Result<PathBuf, ReportError> {
        let body = serde_json::to_string_pretty(report)?;

        fs::create_dir_all(&self.output_dir).map_err(Self::io_err(&self.output_dir))?;

        let path = self
            .output_dir
            .join(Self::file_name(&report.summary.symbol, Utc::now()));

        // Write to temp, then rename.
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, body).map_err(Self::io_err(&tmp_path))?;
        if let Err(source) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(ReportError::Io { path, source });
        }

        Ok(path)
    }
}
