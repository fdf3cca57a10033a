//! Ingestion Pipeline
//!
//! ```text
//! SnapshotSource ─► reading_from_snapshot ─► ReadingStore
//!                                              ├─► shift change? ─► OeeCalculator ─► ShiftResultStore
//!                                              └─► ThresholdEvaluator ─► AlertStore
//! ```
//!
//! Machines are polled sequentially each cycle. Nothing inside a cycle is
//! fatal: a failing machine is logged and retried on the next cycle.

pub mod ingest;
pub mod source;

pub use ingest::{
    reading_from_snapshot, IngestError, IngestOutcome, IngestStats, IngestionLoop, SnapshotError,
};
pub use source::{HttpWatchTableSource, SimulatedSource, SnapshotSource, SourceError};
