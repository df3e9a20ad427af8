//! Read-only access to recorded snapshot history.
//!
//! The replay depends only on [`SnapshotRepository`]; backends validate
//! their records while materializing them, so everything handed to the
//! engine is already typed and checked.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{SnapshotPoint, SnapshotRow};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed data: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Historical snapshot store for one or more symbols.
pub trait SnapshotRepository {
    /// Distinct capture timestamps for `symbol`, ascending, each with the
    /// underlying price recorded at that time.
    fn list_distinct_snapshots(&self, symbol: &str) -> Result<Vec<SnapshotPoint>, RepositoryError>;

    /// All option rows recorded for `symbol` at `timestamp`.
    fn list_rows(
        &self,
        symbol: &str,
        timestamp: NaiveDateTime,
    ) -> Result<Vec<SnapshotRow>, RepositoryError>;
}

impl<R: SnapshotRepository + ?Sized> SnapshotRepository for Box<R> {
    fn list_distinct_snapshots(&self, symbol: &str) -> Result<Vec<SnapshotPoint>, RepositoryError> {
        (**self).list_distinct_snapshots(symbol)
    }

    fn list_rows(
        &self,
        symbol: &str,
        timestamp: NaiveDateTime,
    ) -> Result<Vec<SnapshotRow>, RepositoryError> {
        (**self).list_rows(symbol, timestamp)
    }
}

/// A quote row as persisted: the row itself plus the underlying price
/// captured alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedQuote {
    #[serde(flatten)]
    pub row: SnapshotRow,
    #[serde(default)]
    pub underlying_price: Option<Decimal>,
}

/// All snapshots of one symbol, keyed by capture time.
#[derive(Debug, Clone, Default)]
pub(crate) struct SymbolHistory {
    snapshots: BTreeMap<NaiveDateTime, (Option<Decimal>, Vec<SnapshotRow>)>,
}

impl SymbolHistory {
    fn push(&mut self, quote: RecordedQuote) {
        let entry = self
            .snapshots
            .entry(quote.row.snapshot_time)
            .or_insert((None, Vec::new()));
        // First usable price recorded at a timestamp wins.
        if entry.0.map_or(true, |p| p <= Decimal::ZERO) {
            if let Some(price) = quote.underlying_price {
                entry.0 = Some(price);
            }
        }
        entry.1.push(quote.row);
    }

    pub(crate) fn points(&self) -> Vec<SnapshotPoint> {
        self.snapshots
            .iter()
            .map(|(ts, (price, _))| SnapshotPoint::new(*ts, *price))
            .collect()
    }

    pub(crate) fn rows(&self, timestamp: NaiveDateTime) -> Vec<SnapshotRow> {
        self.snapshots
            .get(&timestamp)
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default()
    }
}

/// Validate recorded quotes and index them by symbol and timestamp.
pub(crate) fn index_quotes(
    quotes: impl IntoIterator<Item = RecordedQuote>,
) -> Result<HashMap<String, SymbolHistory>, RepositoryError> {
    let mut by_symbol: HashMap<String, SymbolHistory> = HashMap::new();
    for quote in quotes {
        quote.row.validate().map_err(|reason| {
            RepositoryError::Malformed(format!(
                "{} @ {}: {}",
                quote.row.symbol, quote.row.snapshot_time, reason
            ))
        })?;
        if quote.underlying_price.is_some_and(|p| p.is_sign_negative()) {
            return Err(RepositoryError::Malformed(format!(
                "{} @ {}: negative underlying price",
                quote.row.symbol, quote.row.snapshot_time
            )));
        }
        by_symbol
            .entry(quote.row.symbol.clone())
            .or_default()
            .push(quote);
    }
    Ok(by_symbol)
}

/// In-memory snapshot store.
///
/// Used for JSON-recorded history and as the fixture backend in tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    symbols: HashMap<String, SymbolHistory>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from recorded quotes, validating every row.
    pub fn from_records(
        quotes: impl IntoIterator<Item = RecordedQuote>,
    ) -> Result<Self, RepositoryError> {
        Ok(Self {
            symbols: index_quotes(quotes)?,
        })
    }

    /// Load a JSON array of recorded quotes.
    pub fn from_json_file(path: &Path) -> Result<Self, RepositoryError> {
        if !path.exists() {
            return Err(RepositoryError::FileNotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        let quotes: Vec<RecordedQuote> = serde_json::from_str(&content)?;
        Self::from_records(quotes)
    }

    /// Insert a whole snapshot. `rows` may be empty to record a timestamp
    /// that captured no quotes.
    pub fn insert_snapshot(
        &mut self,
        symbol: &str,
        point: SnapshotPoint,
        rows: Vec<SnapshotRow>,
    ) -> Result<(), RepositoryError> {
        if point.underlying_price.is_some_and(|p| p.is_sign_negative()) {
            return Err(RepositoryError::Malformed(format!(
                "{symbol} @ {}: negative underlying price",
                point.timestamp
            )));
        }
        for row in &rows {
            if row.symbol != symbol {
                return Err(RepositoryError::Malformed(format!(
                    "{symbol} @ {}: row belongs to {}",
                    point.timestamp, row.symbol
                )));
            }
            row.validate()
                .map_err(|reason| RepositoryError::Malformed(format!("{symbol}: {reason}")))?;
        }
        self.symbols
            .entry(symbol.to_string())
            .or_default()
            .snapshots
            .insert(point.timestamp, (point.underlying_price, rows));
        Ok(())
    }
}

impl SnapshotRepository for MemorySnapshotStore {
    fn list_distinct_snapshots(&self, symbol: &str) -> Result<Vec<SnapshotPoint>, RepositoryError> {
        Ok(self
            .symbols
            .get(symbol)
            .map(SymbolHistory::points)
            .unwrap_or_default())
    }

    fn list_rows(
        &self,
        symbol: &str,
        timestamp: NaiveDateTime,
    ) -> Result<Vec<SnapshotRow>, RepositoryError> {
        Ok(self
            .symbols
            .get(symbol)
            .map(|history| history.rows(timestamp))
            .unwrap_or_default())
    }
}

/// Check the ordering contract of [`SnapshotRepository::list_distinct_snapshots`].
pub fn ensure_ascending(points: &[SnapshotPoint]) -> Result<(), RepositoryError> {
    if let Some(pair) = points.windows(2).find(|w| w[1].timestamp <= w[0].timestamp) {
        return Err(RepositoryError::Malformed(format!(
            "snapshots out of order: {} followed by {}",
            pair[0].timestamp, pair[1].timestamp
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::OptionType;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn quote(time: NaiveDateTime, strike: Decimal, price: Option<Decimal>) -> RecordedQuote {
        RecordedQuote {
            row: SnapshotRow {
                symbol: "SPX".to_string(),
                snapshot_time: time,
                strike,
                option_type: OptionType::Put,
                bid: dec!(1.0),
                ask: dec!(1.1),
                last: dec!(1.05),
                volume: 5,
                open_interest: 50,
                delta: -0.2,
                gamma: 0.01,
                theta: -0.4,
                vega: 0.1,
                expiration_date: time.date(),
            },
            underlying_price: price,
        }
    }

    #[test]
    fn test_distinct_snapshots_are_ascending() {
        let store = MemorySnapshotStore::from_records(vec![
            quote(at(9, 40), dec!(6000), Some(dec!(6010))),
            quote(at(9, 30), dec!(6000), Some(dec!(6020))),
            quote(at(9, 30), dec!(5995), Some(dec!(6020))),
            quote(at(9, 35), dec!(6000), None),
        ])
        .unwrap();

        let points = store.list_distinct_snapshots("SPX").unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].timestamp, at(9, 30));
        assert_eq!(points[0].underlying_price, Some(dec!(6020)));
        assert_eq!(points[1].underlying_price, None);
        assert!(ensure_ascending(&points).is_ok());

        assert_eq!(store.list_rows("SPX", at(9, 30)).unwrap().len(), 2);
        assert!(store.list_rows("SPX", at(10, 0)).unwrap().is_empty());
        assert!(store.list_distinct_snapshots("NDX").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_rows_are_rejected() {
        let mut bad = quote(at(9, 30), dec!(6000), Some(dec!(6020)));
        bad.row.bid = dec!(-1);
        let err = MemorySnapshotStore::from_records(vec![bad]).unwrap_err();
        assert!(matches!(err, RepositoryError::Malformed(_)));
    }

    #[test]
    fn test_insert_rejects_negative_underlying_price() {
        let mut store = MemorySnapshotStore::new();
        let point = SnapshotPoint::new(at(9, 30), Some(dec!(-6020)));
        let err = store.insert_snapshot("SPX", point, Vec::new()).unwrap_err();
        assert!(matches!(err, RepositoryError::Malformed(_)));
        assert!(store.list_distinct_snapshots("SPX").unwrap().is_empty());
    }

    #[test]
    fn test_insert_rejects_rows_for_another_symbol() {
        let mut store = MemorySnapshotStore::new();
        let row = quote(at(9, 30), dec!(6000), None).row;
        let point = SnapshotPoint::new(at(9, 30), Some(dec!(6020)));

        let err = store.insert_snapshot("NDX", point, vec![row.clone()]).unwrap_err();
        assert!(matches!(err, RepositoryError::Malformed(_)));
        assert!(store.list_distinct_snapshots("NDX").unwrap().is_empty());

        store.insert_snapshot("SPX", point, vec![row]).unwrap();
        assert_eq!(store.list_rows("SPX", at(9, 30)).unwrap().len(), 1);
    }

    #[test]
    fn test_out_of_order_points_are_malformed() {
        let points = vec![
            SnapshotPoint::new(at(9, 35), Some(dec!(1))),
            SnapshotPoint::new(at(9, 30), Some(dec!(1))),
        ];
        assert!(matches!(
            ensure_ascending(&points),
            Err(RepositoryError::Malformed(_))
        ));
    }

    #[test]
    fn test_json_file_round_trip() {
        let quotes = vec![quote(at(9, 30), dec!(6000), Some(dec!(6020)))];
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&quotes).unwrap()).unwrap();

        let store = MemorySnapshotStore::from_json_file(file.path()).unwrap();
        let points = store.list_distinct_snapshots("SPX").unwrap();
        assert_eq!(points, vec![SnapshotPoint::new(at(9, 30), Some(dec!(6020)))]);
    }

    #[test]
    fn test_missing_json_file() {
        let err =
            MemorySnapshotStore::from_json_file(Path::new("does/not/exist.json")).unwrap_err();
        assert!(matches!(err, RepositoryError::FileNotFound(_)));
    }
}
