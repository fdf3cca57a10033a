//! PLC-OEE: monitoring and production tracking for extrusion lines
//!
//! ## Architecture
//!
//! - **Acquisition**: TIA Portal watch-table pages to normalized snapshots
//! - **Pipeline**: per-cycle polling, persistence and shift-change detection
//! - **Thresholds**: configurable boolean/range/percent/avg rules
//! - **Storage**: sled trees for readings, alerts, production entries and shift results
//! - **OEE**: Availability × Performance × Quality at shift, day, month and range level

pub mod acquisition;
pub mod config;
pub mod oee;
pub mod pipeline;
pub mod storage;
pub mod thresholds;
pub mod types;

// Re-export configuration
pub use config::{ConfigError, PlantConfig};

// Re-export commonly used types
pub use types::{
    AlertEvent, AlertSummary, DailyOee, Machine, MetricValue, MonthlyOee, OeeScore, Product,
    ProductionEntry, RangeOee, Reading, RuleCondition, Severity, ShiftOee, Snapshot,
    ThresholdRule,
};

// Re-export storage
pub use storage::{Storage, StorageError};

// Re-export engines
pub use oee::{OeeCalculator, OeeError, UnitConverter};
pub use pipeline::{IngestionLoop, SnapshotSource};
pub use thresholds::{ThresholdEvaluator, ThresholdRegistry};
