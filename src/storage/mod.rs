//! Persistent storage on sled
//!
//! One database under `ingestion.data_dir`, one named tree per record kind.
//! Values are JSON; keys are big-endian composites (see [`keys`]) so range
//! scans come back in chronological order. Multi-tree writes go through sled
//! transactions and either land completely or not at all.

pub mod alerts;
pub mod keys;
pub mod lockfile;
pub mod production;
pub mod readings;
pub mod shift_results;

pub use alerts::AlertStore;
pub use lockfile::{LockError, ProcessLock};
pub use production::ProductionStore;
pub use readings::ReadingStore;
pub use shift_results::ShiftResultStore;

use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;
use thiserror::Error;

pub const READINGS_TREE: &str = "readings";
pub const READINGS_BY_MACHINE_TREE: &str = "readings_by_machine";
pub const READINGS_BY_DAY_TREE: &str = "readings_by_day";
pub const ALERT_EVENTS_TREE: &str = "alert_events";
pub const ALERT_SUMMARIES_TREE: &str = "alert_summaries";
pub const ALERT_OPEN_INDEX_TREE: &str = "alert_open_index";
pub const PRODUCTION_TREE: &str = "production_entries";
pub const SHIFT_OEE_TREE: &str = "shift_oee";

/// Error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record in tree '{tree}': {reason}")]
    Corrupt { tree: &'static str, reason: String },

    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: u64 },

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl From<TransactionError<StorageError>> for StorageError {
    fn from(err: TransactionError<StorageError>) -> Self {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => StorageError::Database(e),
        }
    }
}

/// Wrap a storage error so it aborts the surrounding transaction.
pub(crate) fn abort(err: impl Into<StorageError>) -> ConflictableTransactionError<StorageError> {
    ConflictableTransactionError::Abort(err.into())
}

/// Handle to the database and its record stores. Cheap to clone.
#[derive(Clone)]
pub struct Storage {
    db: sled::Db,
    readings: ReadingStore,
    alerts: AlertStore,
    production: ProductionStore,
    shift_results: ShiftResultStore,
}

impl Storage {
    /// Open or create the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        let storage = Self {
            readings: ReadingStore::open(&db)?,
            alerts: AlertStore::open(&db)?,
            production: ProductionStore::open(&db)?,
            shift_results: ShiftResultStore::open(&db)?,
            db,
        };
        tracing::info!(path = %path.display(), readings = storage.readings.count(), "Storage opened");
        Ok(storage)
    }

    pub fn readings(&self) -> &ReadingStore {
        &self.readings
    }

    pub fn alerts(&self) -> &AlertStore {
        &self.alerts
    }

    pub fn production(&self) -> &ProductionStore {
        &self.production
    }

    pub fn shift_results(&self) -> &ShiftResultStore {
        &self.shift_results
    }

    /// Flush pending writes to disk.
    ///
    /// sled flushes in the background; call this before exit.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Storage;
    use tempfile::TempDir;

    /// Fresh database in a temp dir; keep the `TempDir` alive for the test.
    pub fn temp_storage() -> (TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("db")).unwrap();
        (dir, storage)
    }
}
