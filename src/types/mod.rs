//! Shared data structures for PLC monitoring and OEE
//!
//! - Readings: MetricValue, Snapshot, Reading (one per crawl cycle)
//! - Thresholds: ThresholdRule and its kind-specific conditions
//! - Alerts: AlertEvent history and deduplicated AlertSummary
//! - Production: Machine, Product, ProductionEntry reference data
//! - OEE: score and result structures for every granularity

mod alerts;
mod oee;
mod production;
mod reading;
pub mod thresholds;

pub use alerts::*;
pub use oee::*;
pub use production::*;
pub use reading::*;
pub use thresholds::*;
