//! Chain reconstruction.
//!
//! Turns the flat quote rows recorded at one timestamp into a structured
//! [`OptionChainSnapshot`].

use rust_decimal::Decimal;
use thiserror::Error;

use super::types::{OptionChainSnapshot, OptionType, SnapshotPoint, SnapshotRow};

/// A snapshot that cannot seed a signal. Never fatal to a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MissingData {
    #[error("no option rows recorded at {0}")]
    NoRows(chrono::NaiveDateTime),

    #[error("no usable underlying price at {0}")]
    NoUnderlyingPrice(chrono::NaiveDateTime),
}

/// Rebuild the chain for one `(symbol, timestamp)`.
///
/// Rows are partitioned by option type and ordered by strike, then
/// expiration. The underlying price comes from the paired snapshot point;
/// an absent or zero price makes the snapshot unusable.
pub fn reconstruct_chain(
    symbol: &str,
    point: &SnapshotPoint,
    rows: Vec<SnapshotRow>,
) -> Result<OptionChainSnapshot, MissingData> {
    let underlying_price = point
        .underlying_price
        .filter(|p| *p > Decimal::ZERO)
        .ok_or(MissingData::NoUnderlyingPrice(point.timestamp))?;

    if rows.is_empty() {
        return Err(MissingData::NoRows(point.timestamp));
    }

    let (mut calls, mut puts): (Vec<_>, Vec<_>) = rows
        .into_iter()
        .partition(|row| row.option_type == OptionType::Call);

    for side in [&mut calls, &mut puts] {
        side.sort_by(|a, b| {
            a.strike
                .cmp(&b.strike)
                .then(a.expiration_date.cmp(&b.expiration_date))
        });
    }

    Ok(OptionChainSnapshot {
        symbol: symbol.to_string(),
        timestamp: point.timestamp,
        underlying_price,
        calls,
        puts,
    })
}
