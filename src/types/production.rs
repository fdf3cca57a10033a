//! Production reference data: machines, products, production entries

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

fn default_active() -> bool {
    true
}

/// A monitored extrusion line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub id: u32,
    pub name: String,
    /// URL of the PLC web-server watch table page
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Product master data.
///
/// `name` is the catalogue designation `"<diameter> <pressure class> <material>"`,
/// e.g. `"110 PN6 PE80"`; unit conversion depends on that layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub code: String,
    pub name: String,
    /// Linear mass in grams per meter
    #[serde(default)]
    pub weight_per_meter_g: Option<f64>,
    /// Minimum (target) productivity in kg/h
    #[serde(default)]
    pub min_productivity: Option<f64>,
}

/// Explicit standard length for a diameter, taking precedence over the
/// material rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StandardLengthOverride {
    pub diameter_mm: u32,
    pub length_m: f64,
}

/// Output recorded by operators for one machine, date and shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionEntry {
    pub machine_id: u32,
    pub date: NaiveDate,
    pub shift: String,
    pub product_code: String,
    /// Units (coils/bars) that left the machine
    #[serde(default)]
    pub output_quantity: f64,
    /// Units passing quality control
    #[serde(default)]
    pub good_quantity: f64,
    /// Rejected product, already in kg
    #[serde(default)]
    pub defect_weight_kg: f64,
    /// Start-up and trim scrap in kg
    #[serde(default)]
    pub waste_weight_kg: f64,
    /// Per-entry target productivity (kg/h) used when the product has none
    #[serde(default)]
    pub target_productivity: Option<f64>,
    #[serde(default)]
    pub operator_team: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ProductionEntry {
    /// Defect plus waste weight (kg).
    pub fn total_scrap_kg(&self) -> f64 {
        self.defect_weight_kg + self.waste_weight_kg
    }
}
