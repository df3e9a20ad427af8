pub mod analytics;
pub mod backtest;
pub mod data;
pub mod signals;

// Re-export commonly used types
pub use analytics::{CreditSpreadScreener, GexMetrics, SpreadScreenerConfig};
pub use backtest::{
    BacktestError, BacktestReport, EvaluatedTrade, JsonReportWriter, ReplayConfig, ReplayEngine,
    ReportWriter, StopSignal, TradeResult,
};
pub use data::{
    open_store, MemorySnapshotStore, OptionChainSnapshot, OptionType, ParquetSnapshotStore,
    SnapshotPoint, SnapshotRepository, SnapshotRow,
};
pub use signals::{CandidateAlert, Leg, LegAction, SignalEngine, Strategy};
