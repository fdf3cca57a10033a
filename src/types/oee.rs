//! OEE result structures
//!
//! Every result serializes as `{availability, performance, quality, oee, details}`
//! with the score fields flattened into the top level.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Availability × Performance × Quality, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OeeScore {
    pub availability: f64,
    pub performance: f64,
    pub quality: f64,
    pub oee: f64,
}

impl OeeScore {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Clamp each component to `[0, 1]` and multiply. Non-finite inputs count as 0.
    pub fn from_components(availability: f64, performance: f64, quality: f64) -> Self {
        let availability = clamp_unit(availability);
        let performance = clamp_unit(performance);
        let quality = clamp_unit(quality);
        Self {
            availability,
            performance,
            quality,
            oee: availability * performance * quality,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.oee > 0.0
    }
}

fn clamp_unit(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Ratio with a guard: non-positive denominators yield 0.
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 && numerator.is_finite() {
        numerator / denominator
    } else {
        0.0
    }
}

// ============================================================================
// Shift
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShiftDetails {
    pub run_time_minutes: f64,
    pub planned_minutes: f64,
    pub actual_productivity: f64,
    pub target_productivity: f64,
    /// Good units (coils/bars)
    pub good_products: f64,
    pub good_products_kg: f64,
    pub defect_products_kg: f64,
    pub total_products_kg: f64,
    pub reading_count: usize,
    /// Times the runtime counter went backwards inside the shift
    pub runtime_counter_resets: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftOee {
    pub machine_id: u32,
    pub date: NaiveDate,
    pub shift: String,
    #[serde(flatten)]
    pub score: OeeScore,
    /// Absent when the shift had no production entry or no readings
    pub details: Option<ShiftDetails>,
}

impl ShiftOee {
    pub fn empty(machine_id: u32, date: NaiveDate, shift: &str) -> Self {
        Self {
            machine_id,
            date,
            shift: shift.to_string(),
            score: OeeScore::zero(),
            details: None,
        }
    }
}

// ============================================================================
// Day
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyDetails {
    pub valid_shifts: usize,
    pub total_run_time_minutes: f64,
    pub planned_minutes: f64,
    /// Runtime-weighted mean over valid shifts
    pub actual_productivity: f64,
    /// Runtime-weighted mean over valid shifts
    pub target_productivity: f64,
    pub total_good_products_kg: f64,
    pub total_defect_products_kg: f64,
    pub total_products_kg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyOee {
    pub machine_id: u32,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub score: OeeScore,
    pub details: DailyDetails,
    /// Every configured shift, valid or not
    pub shifts: Vec<ShiftOee>,
}

impl DailyOee {
    pub fn is_valid(&self) -> bool {
        self.details.valid_shifts > 0
    }
}

// ============================================================================
// Month
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DayScore {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub score: OeeScore,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyDetails {
    pub year: i32,
    pub month: u32,
    pub valid_days: usize,
    /// Days whose OEE was above zero
    pub days: Vec<DayScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyOee {
    pub machine_id: u32,
    #[serde(flatten)]
    pub score: OeeScore,
    pub details: MonthlyDetails,
}

/// Externally supplied inputs for the design-capacity month method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DesignCapacityParams {
    pub total_month_minutes: f64,
    pub unplanned_minutes: f64,
    /// Nameplate throughput in kg/h
    pub design_capacity_kg_h: f64,
}

impl DesignCapacityParams {
    pub fn planned_minutes(&self) -> f64 {
        self.total_month_minutes - self.unplanned_minutes
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesignCapacityDetails {
    pub year: i32,
    pub month: u32,
    pub total_month_minutes: f64,
    pub unplanned_minutes: f64,
    pub planned_minutes: f64,
    pub total_run_time_minutes: f64,
    pub total_run_time_hours: f64,
    /// Counter resets summed over every shift of the month
    pub runtime_counter_resets: usize,
    pub total_output_quantity: f64,
    pub total_good_quantity: f64,
    pub total_output_kg: f64,
    pub total_good_kg: f64,
    pub total_defect_weight_kg: f64,
    pub total_waste_weight_kg: f64,
    pub total_scrap_kg: f64,
    pub actual_hourly_rate: f64,
    pub design_capacity_kg_h: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignCapacityOee {
    pub machine_id: u32,
    #[serde(flatten)]
    pub score: OeeScore,
    pub details: DesignCapacityDetails,
}

// ============================================================================
// Date range
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeSummary {
    pub valid_days: usize,
    pub total_run_time_minutes: f64,
    pub planned_minutes: f64,
    pub actual_productivity: f64,
    pub target_productivity: f64,
    pub total_good_products_kg: f64,
    pub total_defect_products_kg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeOee {
    pub machine_id: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(flatten)]
    pub score: OeeScore,
    pub details: RangeSummary,
    pub days: Vec<DailyOee>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components_are_clamped() {
        let score = OeeScore::from_components(1.4, -0.2, 0.5);
        assert_eq!(score.availability, 1.0);
        assert_eq!(score.performance, 0.0);
        assert_eq!(score.oee, 0.0);

        let score = OeeScore::from_components(f64::NAN, 0.5, 0.5);
        assert_eq!(score.availability, 0.0);
    }

    #[test]
    fn test_safe_ratio_guards_denominator() {
        assert_eq!(safe_ratio(5.0, 0.0), 0.0);
        assert_eq!(safe_ratio(5.0, -1.0), 0.0);
        assert_eq!(safe_ratio(5.0, 10.0), 0.5);
    }

    #[test]
    fn test_flattened_json_shape() {
        let day = DayScore {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            score: OeeScore::from_components(0.5, 0.5, 0.9),
        };
        let json = serde_json::to_value(day).unwrap();
        assert_eq!(json["date"], "2024-05-01");
        assert!((json["oee"].as_f64().unwrap() - 0.225).abs() < 1e-12);
    }
}
