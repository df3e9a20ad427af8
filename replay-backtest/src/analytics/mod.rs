//! Options analytics module.
//!
//! Provides:
//! - Gamma exposure (GEX) metrics per chain snapshot
//! - Credit spread screening, the bundled signal engine

pub mod gex;
pub mod spread_screener;

pub use gex::{GexMetrics, StrikeExposure};
pub use spread_screener::{CreditSpreadScreener, SpreadCandidate, SpreadScreenerConfig};
