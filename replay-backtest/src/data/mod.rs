pub mod chain;
pub mod parquet;
pub mod repository;
pub mod types;

use std::path::Path;

pub use chain::{reconstruct_chain, MissingData};
pub use parquet::{ParquetSnapshotStore, EXPECTED_COLUMNS};
pub use repository::{
    ensure_ascending, MemorySnapshotStore, RecordedQuote, RepositoryError, SnapshotRepository,
};
pub use types::{
    parse_snapshot_time, OptionChainSnapshot, OptionType, PricePoint, SnapshotPoint, SnapshotRow,
};

/// Open the snapshot store at `path`, picking the backend from the file
/// extension: `.json` is loaded into memory, anything else is read as
/// parquet (a single file or a directory of files).
pub fn open_store(path: &Path) -> Result<Box<dyn SnapshotRepository + Send>, RepositoryError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(Box::new(MemorySnapshotStore::from_json_file(path)?)),
        _ => Ok(Box::new(ParquetSnapshotStore::open(path)?)),
    }
}
