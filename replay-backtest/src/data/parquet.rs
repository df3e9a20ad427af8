//! Parquet snapshot backend.
//!
//! Reads recorded quotes from a parquet file, or a directory of parquet
//! files, with one row per option contract per capture time:
//! - symbol, snapshot_time, strike, type, expiration_date
//! - bid, ask, last, volume, open_interest
//! - delta, gamma, theta, vega, underlying_price
//!
//! A symbol's history is materialized and validated on first access and
//! then served from memory for the rest of the run.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use super::repository::{
    index_quotes, RecordedQuote, RepositoryError, SnapshotRepository, SymbolHistory,
};
use super::types::{parse_snapshot_time, OptionType, SnapshotPoint, SnapshotRow};

/// Expected columns in the parquet files.
pub const EXPECTED_COLUMNS: &[&str] = &[
    "symbol",
    "snapshot_time",
    "strike",
    "type",
    "bid",
    "ask",
    "last",
    "volume",
    "open_interest",
    "delta",
    "gamma",
    "theta",
    "vega",
    "expiration_date",
    "underlying_price",
];

/// Parquet-backed [`SnapshotRepository`].
pub struct ParquetSnapshotStore {
    files: Vec<PathBuf>,
    cache: RefCell<HashMap<String, SymbolHistory>>,
}

impl ParquetSnapshotStore {
    /// Open a parquet file, or every `*.parquet` file in a directory.
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        if !path.exists() {
            return Err(RepositoryError::FileNotFound(path.display().to_string()));
        }

        let files = if path.is_dir() {
            let mut files = Vec::new();
            for entry in std::fs::read_dir(path)? {
                let entry = entry?;
                let file = entry.path();
                if file.extension().and_then(|e| e.to_str()) == Some("parquet") {
                    files.push(file);
                }
            }
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };

        if files.is_empty() {
            return Err(RepositoryError::FileNotFound(format!(
                "{}/*.parquet",
                path.display()
            )));
        }

        Ok(Self {
            files,
            cache: RefCell::new(HashMap::new()),
        })
    }

    /// Files backing this store.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    fn scan(&self) -> Result<LazyFrame, RepositoryError> {
        let mut frames = Vec::with_capacity(self.files.len());
        for file in &self.files {
            frames.push(LazyFrame::scan_parquet(file, ScanArgsParquet::default())?);
        }
        Ok(concat(&frames, UnionArgs::default())?)
    }

    /// Load and validate every quote recorded for `symbol`.
    fn load_symbol(&self, symbol: &str) -> Result<Vec<RecordedQuote>, RepositoryError> {
        let df = self
            .scan()?
            .filter(col("symbol").eq(lit(symbol)))
            .select([
                col("symbol"),
                col("snapshot_time").cast(DataType::String),
                col("strike").cast(DataType::Float64),
                col("type"),
                col("bid").cast(DataType::Float64),
                col("ask").cast(DataType::Float64),
                col("last").cast(DataType::Float64),
                col("volume").cast(DataType::Int64),
                col("open_interest").cast(DataType::Int64),
                col("delta").cast(DataType::Float64),
                col("gamma").cast(DataType::Float64),
                col("theta").cast(DataType::Float64),
                col("vega").cast(DataType::Float64),
                col("expiration_date").cast(DataType::String),
                col("underlying_price").cast(DataType::Float64),
            ])
            .collect()?;

        debug!(symbol, rows = df.height(), "loaded parquet rows");
        dataframe_to_quotes(&df)
    }

    fn with_history<T>(
        &self,
        symbol: &str,
        f: impl FnOnce(&SymbolHistory) -> T,
    ) -> Result<T, RepositoryError> {
        if !self.cache.borrow().contains_key(symbol) {
            let quotes = self.load_symbol(symbol)?;
            let history = index_quotes(quotes)?.remove(symbol).unwrap_or_default();
            self.cache.borrow_mut().insert(symbol.to_string(), history);
        }
        let cache = self.cache.borrow();
        let history = cache.get(symbol).ok_or_else(|| {
            RepositoryError::Malformed(format!("history for {symbol} was not cached"))
        })?;
        Ok(f(history))
    }
}

impl SnapshotRepository for ParquetSnapshotStore {
    fn list_distinct_snapshots(&self, symbol: &str) -> Result<Vec<SnapshotPoint>, RepositoryError> {
        self.with_history(symbol, SymbolHistory::points)
    }

    fn list_rows(
        &self,
        symbol: &str,
        timestamp: NaiveDateTime,
    ) -> Result<Vec<SnapshotRow>, RepositoryError> {
        self.with_history(symbol, |history| history.rows(timestamp))
    }
}

fn decimal(value: f64, field: &str, idx: usize) -> Result<Decimal, RepositoryError> {
    Decimal::from_f64(value)
        .ok_or_else(|| RepositoryError::Malformed(format!("row {idx}: {field} is not finite")))
}

fn required<T>(value: Option<T>, field: &str, idx: usize) -> Result<T, RepositoryError> {
    value.ok_or_else(|| RepositoryError::Malformed(format!("row {idx}: missing {field}")))
}

/// Convert a normalized DataFrame into recorded quotes.
fn dataframe_to_quotes(df: &DataFrame) -> Result<Vec<RecordedQuote>, RepositoryError> {
    let symbol_col = df.column("symbol")?.str()?;
    let time_col = df.column("snapshot_time")?.str()?;
    let strike_col = df.column("strike")?.f64()?;
    let type_col = df.column("type")?.str()?;
    let bid_col = df.column("bid")?.f64()?;
    let ask_col = df.column("ask")?.f64()?;
    let last_col = df.column("last")?.f64()?;
    let volume_col = df.column("volume")?.i64()?;
    let oi_col = df.column("open_interest")?.i64()?;
    let delta_col = df.column("delta")?.f64()?;
    let gamma_col = df.column("gamma")?.f64()?;
    let theta_col = df.column("theta")?.f64()?;
    let vega_col = df.column("vega")?.f64()?;
    let expir_col = df.column("expiration_date")?.str()?;
    let price_col = df.column("underlying_price")?.f64()?;

    let mut quotes = Vec::with_capacity(df.height());

    for idx in 0..df.height() {
        let raw_time = required(time_col.get(idx), "snapshot_time", idx)?;
        let snapshot_time = parse_snapshot_time(raw_time).ok_or_else(|| {
            RepositoryError::Malformed(format!("row {idx}: invalid snapshot_time {raw_time}"))
        })?;

        let raw_type = required(type_col.get(idx), "type", idx)?;
        let option_type = OptionType::from_str(raw_type).ok_or_else(|| {
            RepositoryError::Malformed(format!("row {idx}: invalid option type {raw_type}"))
        })?;

        // Date columns cast to string render as YYYY-MM-DD; datetimes keep a time suffix.
        let raw_expir = required(expir_col.get(idx), "expiration_date", idx)?;
        let expiration_date =
            NaiveDate::parse_from_str(raw_expir.get(..10).unwrap_or(raw_expir), "%Y-%m-%d")
                .map_err(|e| {
                    RepositoryError::Malformed(format!("row {idx}: invalid expiration_date: {e}"))
                })?;

        let underlying_price = price_col
            .get(idx)
            .map(|p| decimal(p, "underlying_price", idx))
            .transpose()?;

        quotes.push(RecordedQuote {
            row: SnapshotRow {
                symbol: required(symbol_col.get(idx), "symbol", idx)?.to_string(),
                snapshot_time,
                strike: decimal(required(strike_col.get(idx), "strike", idx)?, "strike", idx)?,
                option_type,
                bid: decimal(bid_col.get(idx).unwrap_or(0.0), "bid", idx)?,
                ask: decimal(ask_col.get(idx).unwrap_or(0.0), "ask", idx)?,
                last: decimal(last_col.get(idx).unwrap_or(0.0), "last", idx)?,
                volume: volume_col.get(idx).unwrap_or(0),
                open_interest: oi_col.get(idx).unwrap_or(0),
                delta: delta_col.get(idx).unwrap_or(0.0),
                gamma: gamma_col.get(idx).unwrap_or(0.0),
                theta: theta_col.get(idx).unwrap_or(0.0),
                vega: vega_col.get(idx).unwrap_or(0.0),
                expiration_date,
            },
            underlying_price,
        });
    }

    Ok(quotes)
}
