//! Replay orchestrator.
//!
//! Runs one symbol through the snapshot history:
//! 1. Fetch the ordered snapshot timestamps
//! 2. Rebuild the option chain at each timestamp
//! 3. Compute GEX metrics and ask the signal engine for alerts
//! 4. Score every non-warning alert against the rest of its trading day
//! 5. Fold the scored trades into the aggregate and build the report
//!
//! The loop is strictly sequential. Forward scans read the same in-memory
//! price timeline the outer loop walks; nothing is re-fetched.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::analytics::{CreditSpreadScreener, GexMetrics};
use crate::data::{
    ensure_ascending, reconstruct_chain, PricePoint, RepositoryError, SnapshotRepository,
};
use crate::signals::SignalEngine;

use super::aggregator::PerformanceAggregator;
use super::config::ReplayConfig;
use super::outcome::{evaluate, EvaluatedTrade};
use super::report::{BacktestReport, ReplayCounters, ReportError, ReportWriter};

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("Replay cancelled after {processed} of {total} snapshots")]
    Cancelled { processed: usize, total: usize },
}

/// Cooperative cancellation flag, checked between snapshots.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives a full replay for one symbol.
pub struct ReplayEngine<R, S> {
    config: ReplayConfig,
    repository: R,
    signals: S,
}

impl<R: SnapshotRepository> ReplayEngine<R, CreditSpreadScreener> {
    /// Engine using the bundled credit spread screener.
    pub fn with_screener(config: ReplayConfig, repository: R) -> Self {
        let screener = CreditSpreadScreener::new(config.screener.clone())
            .with_warning_marker(config.warning_marker.clone());
        Self::new(config, repository, screener)
    }
}

impl<R: SnapshotRepository, S: SignalEngine> ReplayEngine<R, S> {
    pub fn new(config: ReplayConfig, repository: R, signals: S) -> Self {
        Self {
            config,
            repository,
            signals,
        }
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    fn progress_bar(&self, len: usize, symbol: &str) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .map(|s| s.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb.set_message(symbol.to_string());
        pb
    }

    /// Replay `symbol` and build its report.
    ///
    /// Missing data and signal-engine failures skip the affected snapshot.
    /// Repository failures and cancellation abort the run.
    pub fn run(&self, symbol: &str, stop: &StopSignal) -> Result<BacktestReport, BacktestError> {
        let points = self.repository.list_distinct_snapshots(symbol)?;
        ensure_ascending(&points)?;

        let timeline: Vec<PricePoint> = points.iter().filter_map(|p| p.priced()).collect();
        let total = points.len();
        info!(
            symbol,
            snapshots = total,
            priced = timeline.len(),
            "Starting replay"
        );

        let marker = self.config.warning_marker.as_str();
        let mut counters = ReplayCounters::default();
        let mut aggregate = PerformanceAggregator::new();
        let mut trades: Vec<EvaluatedTrade> = Vec::new();
        // Index into `timeline` of the next priced snapshot.
        let mut cursor = 0usize;

        let pb = self.progress_bar(total, symbol);

        for (processed, point) in points.iter().enumerate() {
            if stop.is_stopped() {
                pb.abandon_with_message("cancelled");
                warn!(symbol, processed, total, "Replay cancelled");
                return Err(BacktestError::Cancelled { processed, total });
            }
            pb.inc(1);

            let entry_index = cursor;
            if point.priced().is_some() {
                cursor += 1;
            }

            let rows = self.repository.list_rows(symbol, point.timestamp)?;
            let chain = match reconstruct_chain(symbol, point, rows) {
                Ok(chain) => chain,
                Err(missing) => {
                    warn!(symbol, %missing, "Skipping snapshot");
                    counters.skipped_snapshots += 1;
                    continue;
                }
            };

            let metrics = GexMetrics::from_chain(&chain);
            let day = chain.trading_day();
            let alerts = match self.signals.generate(symbol, &metrics, &chain, day) {
                Ok(alerts) => alerts,
                Err(e) => {
                    warn!(
                        symbol,
                        timestamp = %point.timestamp,
                        error = %e,
                        "Signal engine failed"
                    );
                    counters.skipped_snapshots += 1;
                    continue;
                }
            };

            for alert in alerts {
                if alert.is_warning(marker) {
                    debug!(id = %alert.id, "Ignoring warning notice");
                    counters.warnings += 1;
                    continue;
                }
                counters.candidate_alerts += 1;

                let Some(trade) = evaluate(alert, &timeline, entry_index) else {
                    continue;
                };

                if !trade.is_scoreable() {
                    counters.unscoreable += 1;
                    warn!(id = %trade.alert.id, "Alert has no short leg");
                    if !self.config.record_unscoreable {
                        continue;
                    }
                }

                debug!(
                    id = %trade.alert.id,
                    result = ?trade.result,
                    pnl = %trade.pnl,
                    "Trade evaluated"
                );
                aggregate.record(&trade);
                trades.push(trade);
            }
        }
        pb.finish_and_clear();

        let report = BacktestReport::build(symbol, total, counters, &aggregate, trades);
        info!(
            symbol,
            trades = report.summary.total_trades,
            wins = report.summary.wins,
            losses = report.summary.losses,
            pnl = %report.summary.total_pnl,
            "Replay complete"
        );
        Ok(report)
    }

    /// Replay `symbol` and persist the report. Nothing is written unless the
    /// run completes.
    pub fn run_and_write(
        &self,
        symbol: &str,
        stop: &StopSignal,
        writer: &dyn ReportWriter,
    ) -> Result<(BacktestReport, PathBuf), BacktestError> {
        let report = self.run(symbol, stop)?;
        let path = writer.write(&report)?;
        info!(path = %path.display(), "Report written");
        Ok((report, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        MemorySnapshotStore, OptionChainSnapshot, OptionType, SnapshotPoint, SnapshotRow,
    };
    use crate::signals::{CandidateAlert, Leg, LegAction, SignalError, Strategy};
    use chrono::{NaiveDate, NaiveDateTime};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::cell::Cell;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn row(ts: NaiveDateTime) -> SnapshotRow {
        SnapshotRow {
            symbol: "SPX".to_string(),
            snapshot_time: ts,
            strike: dec!(6000),
            option_type: OptionType::Put,
            bid: dec!(1),
            ask: dec!(1.2),
            last: dec!(1.1),
            volume: 10,
            open_interest: 100,
            delta: -0.2,
            gamma: 0.01,
            theta: -0.5,
            vega: 0.1,
            expiration_date: ts.date(),
        }
    }

    fn store(prices: &[(NaiveDateTime, Option<Decimal>)]) -> MemorySnapshotStore {
        let mut store = MemorySnapshotStore::new();
        for &(ts, price) in prices {
            store
                .insert_snapshot("SPX", SnapshotPoint::new(ts, price), vec![row(ts)])
                .unwrap();
        }
        store
    }

    /// Emits one bull put spread on the first call only.
    struct FirstSnapshotOnly {
        fired: Cell<bool>,
    }

    impl SignalEngine for FirstSnapshotOnly {
        fn generate(
            &self,
            symbol: &str,
            _metrics: &GexMetrics,
            chain: &OptionChainSnapshot,
            _day: NaiveDate,
        ) -> Result<Vec<CandidateAlert>, SignalError> {
            if self.fired.replace(true) {
                return Ok(Vec::new());
            }
            Ok(vec![CandidateAlert {
                id: format!("{}-{}", symbol, chain.timestamp),
                strategy: Strategy::BullPutSpread,
                legs: vec![
                    Leg {
                        action: LegAction::Sell,
                        option_type: OptionType::Put,
                        strike: dec!(6000),
                        price: dec!(3),
                        delta: -0.2,
                    },
                    Leg {
                        action: LegAction::Buy,
                        option_type: OptionType::Put,
                        strike: dec!(5995),
                        price: dec!(0.7),
                        delta: -0.15,
                    },
                ],
                net_credit: dec!(2.3),
                max_loss: dec!(2.7),
                max_profit: dec!(2.3),
                quality_score: 80.0,
            }])
        }
    }

    fn config() -> ReplayConfig {
        ReplayConfig {
            show_progress: false,
            ..ReplayConfig::default()
        }
    }

    fn engine(store: MemorySnapshotStore) -> ReplayEngine<MemorySnapshotStore, FirstSnapshotOnly> {
        ReplayEngine::new(
            config(),
            store,
            FirstSnapshotOnly {
                fired: Cell::new(false),
            },
        )
    }

    #[test]
    fn test_loss_scenario_end_to_end() {
        let store = store(&[
            (at(9, 30), Some(dec!(6020))),
            (at(9, 35), Some(dec!(6015))),
            (at(9, 40), Some(dec!(5995))),
        ]);
        let report = engine(store).run("SPX", &StopSignal::new()).unwrap();

        assert_eq!(report.summary.total_snapshots, 3);
        assert_eq!(report.summary.losses, 1);
        assert_eq!(report.summary.total_pnl, dec!(-270));
        assert_eq!(report.signals[0].exit_time, at(9, 40));
    }

    #[test]
    fn test_unpriced_snapshot_is_skipped_not_scanned() {
        // The unpriced 09:35 snapshot neither enters trades nor breaches.
        let store = store(&[
            (at(9, 30), Some(dec!(6020))),
            (at(9, 35), None),
            (at(9, 40), Some(dec!(6025))),
        ]);
        let report = engine(store).run("SPX", &StopSignal::new()).unwrap();

        assert_eq!(report.summary.total_snapshots, 3);
        assert_eq!(report.statistics.skipped_snapshots, 1);
        assert_eq!(report.summary.wins, 1);
        assert_eq!(report.summary.total_pnl, dec!(230));
    }

    #[test]
    fn test_entry_index_tracks_priced_timeline() {
        // The first snapshot is unpriced, so the alert fires at 09:35.
        let store = store(&[
            (at(9, 30), None),
            (at(9, 35), Some(dec!(6020))),
            (at(9, 40), Some(dec!(5990))),
        ]);
        let report = engine(store).run("SPX", &StopSignal::new()).unwrap();

        let trade = &report.signals[0];
        assert_eq!(trade.entry_time, at(9, 35));
        assert_eq!(trade.entry_price, dec!(6020));
        assert_eq!(trade.exit_time, at(9, 40));
    }

    #[test]
    fn test_stop_before_start_cancels() {
        let store = store(&[(at(9, 30), Some(dec!(6020)))]);
        let stop = StopSignal::new();
        stop.stop();

        let err = engine(store).run("SPX", &stop).unwrap_err();
        assert!(matches!(
            err,
            BacktestError::Cancelled {
                processed: 0,
                total: 1
            }
        ));
    }

    #[test]
    fn test_stop_signal_is_shared() {
        let stop = StopSignal::new();
        let clone = stop.clone();
        assert!(!stop.is_stopped());
        clone.stop();
        assert!(stop.is_stopped());
    }
}
