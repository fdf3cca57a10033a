//! OEE Module - Availability × Performance × Quality rollups
//!
//! - `conversion`: unit counts to kilograms
//! - `calculator`: shift, day, month (two methods) and date-range OEE
//!
//! Planned time differs per rollup. Days plan `shift_minutes` per valid
//! shift, ranges plan `day_minutes` per valid day, and the design-capacity
//! month takes planned minus unplanned minutes from the caller.

pub mod calculator;
pub mod conversion;

pub use calculator::{runtime_from_counter, OeeCalculator};
pub use conversion::UnitConverter;

use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum OeeError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid period: {0}")]
    InvalidPeriod(String),
}
