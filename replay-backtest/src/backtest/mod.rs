//! Snapshot replay and trade scoring.
//!
//! - Outcome evaluation (same-day stop rule, provisional wins)
//! - Performance aggregation
//! - Report assembly and atomic JSON output
//! - The orchestrator driving a full symbol run

pub mod aggregator;
pub mod config;
pub mod engine;
pub mod outcome;
pub mod report;

pub use aggregator::{PerformanceAggregator, StrategyStats};
pub use config::{ConfigError, ReplayConfig};
pub use engine::{BacktestError, ReplayEngine, StopSignal};
pub use outcome::{
    evaluate, realized_pnl, EvaluatedTrade, OutcomeTracker, ScanControl, StopRule, TradeResult,
    CONTRACT_MULTIPLIER,
};
pub use report::{
    format_currency, format_percent, BacktestReport, JsonReportWriter, ReplayCounters,
    ReportError, ReportStatistics, ReportSummary, ReportWriter,
};
