//! Config validation: unknown-key detection with Levenshtein suggestions
//! and operational sanity checks.
//!
//! Two-pass parse: the raw TOML is first walked as a `toml::Value` tree and
//! compared against the known key set, emitting "did you mean?" warnings.
//! Serde deserialization then runs as normal. Warnings never break a config.

use std::collections::HashSet;

use super::PlantConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Complete set of valid dotted key paths for `PlantConfig`.
///
/// Array-of-table sections (`[[machines]]` etc.) list their element keys
/// under the section name. Keep in sync with plant_config.rs and the types
/// the catalog sections deserialize into.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [plant]
        "plant",
        "plant.name",
        "plant.site",
        // [ingestion]
        "ingestion",
        "ingestion.interval_secs",
        "ingestion.request_timeout_secs",
        "ingestion.data_dir",
        "ingestion.fields",
        "ingestion.fields.shift",
        "ingestion.fields.date",
        "ingestion.fields.runtime_minutes",
        // [oee]
        "oee",
        "oee.throughput_key",
        "oee.shift_minutes",
        "oee.day_minutes",
        "oee.shifts",
        // [alerts]
        "alerts",
        "alerts.avg_window_minutes",
        // [[machines]]
        "machines",
        "machines.id",
        "machines.name",
        "machines.endpoint",
        "machines.active",
        // [[products]]
        "products",
        "products.code",
        "products.name",
        "products.weight_per_meter_g",
        "products.min_productivity",
        // [[standard_lengths]]
        "standard_lengths",
        "standard_lengths.diameter_mm",
        "standard_lengths.length_m",
        // [[thresholds]]
        "thresholds",
        "thresholds.id",
        "thresholds.machine_id",
        "thresholds.name",
        "thresholds.metric_key",
        "thresholds.active",
        "thresholds.kind",
        "thresholds.trigger_value",
        "thresholds.message",
        "thresholds.min",
        "thresholds.max",
        "thresholds.base_value",
        "thresholds.allowed_percent",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// A table `{ a = { b = 1 } }` yields `["a", "a.b"]`. Tables inside arrays
/// are walked under the array's path, so `[[machines]] id = 1` yields
/// `["machines", "machines.id"]`. Duplicates are removed.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    collect_keys(value, prefix, &mut keys);
    let mut seen = HashSet::new();
    keys.retain(|k| seen.insert(k.clone()));
    keys
}

fn collect_keys(value: &toml::Value, prefix: &str, keys: &mut Vec<String>) {
    match value {
        toml::Value::Table(table) => {
            for (k, v) in table {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                keys.push(path.clone());
                collect_keys(v, &path, keys);
            }
        }
        toml::Value::Array(items) => {
            for item in items.iter().filter(|i| i.is_table()) {
                collect_keys(item, prefix, keys);
            }
        }
        _ => {}
    }
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let b_len = b_chars.len();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (*k, levenshtein(unknown, k)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Parse errors yield no warnings; serde reports them afterwards.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Operational Sanity Checks
// ============================================================================

/// Flag settings that are legal but probably not what the operator meant.
pub fn validate_operational_ranges(config: &PlantConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let window_secs = config.alerts.avg_window_minutes.saturating_mul(60);
    if window_secs > 0 && (window_secs as u64) < config.ingestion.interval_secs.saturating_mul(2) {
        warnings.push(ValidationWarning {
            field: "alerts.avg_window_minutes".to_string(),
            message: format!(
                "avg_window_minutes ({}) holds fewer than two readings at interval_secs = {}; avg rules compare a reading with itself",
                config.alerts.avg_window_minutes, config.ingestion.interval_secs
            ),
            suggestion: None,
        });
    }

    let planned_day = config.oee.shift_minutes * config.oee.shifts.len() as f64;
    if planned_day > config.oee.day_minutes {
        warnings.push(ValidationWarning {
            field: "oee.shift_minutes".to_string(),
            message: format!(
                "{} shifts of {} min exceed the {} min day",
                config.oee.shifts.len(),
                config.oee.shift_minutes,
                config.oee.day_minutes
            ),
            suggestion: None,
        });
    }

    for p in &config.products {
        if p.min_productivity.map_or(true, |v| v <= 0.0) {
            warnings.push(ValidationWarning {
                field: format!("products[{}].min_productivity", p.code),
                message: format!(
                    "product {} has no min_productivity; performance falls back to the entry target",
                    p.code
                ),
                suggestion: None,
            });
        }
        if p.weight_per_meter_g.map_or(true, |v| v <= 0.0) {
            warnings.push(ValidationWarning {
                field: format!("products[{}].weight_per_meter_g", p.code),
                message: format!(
                    "product {} has no weight_per_meter_g; its output converts to 0 kg",
                    p.code
                ),
                suggestion: None,
            });
        }
    }

    for m in config.machines.iter().filter(|m| m.active) {
        if m.endpoint.trim().is_empty() {
            warnings.push(ValidationWarning {
                field: format!("machines[{}].endpoint", m.id),
                message: format!("active machine {} has no endpoint; only --simulate can poll it", m.id),
                suggestion: None,
            });
        }
    }
    for rule in config.thresholds.iter().filter(|r| r.active) {
        if config.machine(rule.machine_id).is_some_and(|m| !m.active) {
            warnings.push(ValidationWarning {
                field: format!("thresholds[{}]", rule.id),
                message: format!(
                    "rule {} watches inactive machine {}",
                    rule.id, rule.machine_id
                ),
                suggestion: None,
            });
        }
    }

    warnings
}

// ============================================================================
// Tests
// ============================================================================
