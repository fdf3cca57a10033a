//! Unit conversion: produced units (coils/bars) to kilograms
//!
//! A product's catalogue name encodes `"<diameter> <pressure class> <material>"`;
//! the diameter and material pick a standard length per unit, and the
//! product's linear mass turns meters into grams.
//!
//! Standard length resolution, first match wins:
//!
//! 1. explicit `[[standard_lengths]]` entry for the diameter (if > 0)
//! 2. material contains `PPR`: 4 m bars
//! 3. material contains `PSU`: 6 m bars
//! 4. material contains `PE`: coil table up to 90 mm (default 100 m), 6 m bars above
//! 5. anything else: 100 m

use std::collections::HashMap;

use crate::config::defaults;
use crate::types::{Product, StandardLengthOverride};

/// Diameter and material parsed from a catalogue name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Designation<'a> {
    pub diameter_mm: u32,
    pub material: &'a str,
}

/// Split a catalogue name such as `"110 PN6 PE80"`.
///
/// `None` when the name has fewer than three tokens or the first token
/// does not start with digits.
pub fn parse_designation(name: &str) -> Option<Designation<'_>> {
    let tokens: Vec<&str> = name.split_whitespace().collect();
    if tokens.len() < 3 {
        return None;
    }
    let digits: String = tokens[0].chars().take_while(char::is_ascii_digit).collect();
    let diameter_mm = digits.parse().ok()?;
    Some(Designation {
        diameter_mm,
        material: tokens[2],
    })
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Product catalogue plus the standard-length override table.
#[derive(Debug, Clone, Default)]
pub struct UnitConverter {
    products: HashMap<String, Product>,
    overrides: HashMap<u32, f64>,
}

impl UnitConverter {
    pub fn new(products: &[Product], overrides: &[StandardLengthOverride]) -> Self {
        Self {
            products: products
                .iter()
                .map(|p| (p.code.clone(), p.clone()))
                .collect(),
            overrides: overrides
                .iter()
                .map(|o| (o.diameter_mm, o.length_m))
                .collect(),
        }
    }

    pub fn product(&self, code: &str) -> Option<&Product> {
        self.products.get(code)
    }

    /// Length of one unit in meters.
    pub fn standard_length(&self, diameter_mm: u32, material: &str) -> f64 {
        if let Some(&length) = self.overrides.get(&diameter_mm) {
            if length > 0.0 {
                return length;
            }
        }

        if material.contains("PPR") {
            return defaults::PPR_LENGTH_M;
        }
        if material.contains("PSU") {
            return defaults::PSU_LENGTH_M;
        }
        if material.contains("PE") {
            if diameter_mm > defaults::PE_COIL_MAX_DIAMETER_MM {
                return defaults::PE_BAR_LENGTH_M;
            }
            return defaults::PE_COIL_LENGTHS
                .iter()
                .find(|(d, _)| *d == diameter_mm)
                .map_or(defaults::PE_DEFAULT_COIL_LENGTH_M, |(_, len)| *len);
        }
        defaults::FALLBACK_LENGTH_M
    }

    /// Mass in kg of `quantity` units of `product_code`, rounded to 2 decimals.
    ///
    /// 0 for an empty code, an unknown product, a non-positive quantity, a
    /// missing or non-positive linear mass, or an unparseable name.
    pub fn to_kilograms(&self, product_code: &str, quantity: f64) -> f64 {
        if product_code.is_empty() || !(quantity > 0.0) {
            return 0.0;
        }
        let Some(product) = self.products.get(product_code) else {
            return 0.0;
        };
        let Some(g_per_m) = product.weight_per_meter_g.filter(|g| *g > 0.0) else {
            return 0.0;
        };
        let Some(designation) = parse_designation(&product.name) else {
            return 0.0;
        };

        let length = self.standard_length(designation.diameter_mm, designation.material);
        round2(quantity * length * g_per_m / 1000.0)
    }
}
