//! Config Validation Tests
//!
//! Typo detection and operational sanity checks, exercised independently
//! from the rest of the pipeline.

use std::io::Write;

use plc_oee::config::validation::{
    known_config_keys, suggest_correction, validate_operational_ranges, validate_unknown_keys,
};
use plc_oee::config::{ConfigError, PlantConfig};
use plc_oee::types::RuleCondition;

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_ingestion_section_warns_with_suggestion() {
    let toml_str = r#"
[ingestion]
interval_sec = 5
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("interval_sec"));
    assert_eq!(
        warnings[0].suggestion.as_deref(),
        Some("ingestion.interval_secs")
    );
}

#[test]
fn typo_inside_array_table_warns() {
    let toml_str = r#"
[[thresholds]]
id = 1
machine_id = 1
metric_key = "ap_luc_nhua"
kind = "percent"
base_valu = 100.0
allowed_percent = 20.0
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "{warnings:?}");
    assert_eq!(
        warnings[0].suggestion.as_deref(),
        Some("thresholds.base_value")
    );
}

#[test]
fn valid_config_produces_zero_warnings() {
    let toml_str = r#"
[plant]
name = "Nha may 1"
site = "Binh Duong"

[ingestion]
interval_secs = 5
request_timeout_secs = 10
data_dir = "./data"

[ingestion.fields]
shift = "datalog_data_ca"
date = "datalog_date"
runtime_minutes = "datalog_data_gio_chay_2"

[oee]
throughput_key = "nang_suatkg_h"
shift_minutes = 480.0
day_minutes = 1440.0
shifts = ["CA1", "CA2", "CA3"]

[alerts]
avg_window_minutes = 10

[[machines]]
id = 1
name = "Line 1"
endpoint = "http://10.0.0.11/awp/watch.html"
active = true

[[products]]
code = "PE110"
name = "110 PN6 PE80"
weight_per_meter_g = 1500.0
min_productivity = 100.0

[[standard_lengths]]
diameter_mm = 45
length_m = 150.0

[[thresholds]]
id = 1
machine_id = 1
name = "Melt pressure"
metric_key = "ap_luc_nhua"
active = true
kind = "range"
min = 10.0
max = 90.0
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(warnings.is_empty(), "{warnings:?}");

    let config = PlantConfig::from_toml_str(toml_str).unwrap();
    assert!(validate_operational_ranges(&config).is_empty());
}

#[test]
fn distant_key_gets_no_suggestion() {
    let known = known_config_keys();
    assert_eq!(suggest_correction("completely_unrelated", &known), None);
}

// ============================================================================
// Loading and Validation
// ============================================================================

#[test]
fn load_from_file_reports_path_on_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[plant\nname = 1").unwrap();

    let err = PlantConfig::load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(..)), "{err:?}");
    assert!(err.to_string().contains(&file.path().display().to_string()));
}

#[test]
fn duplicate_ids_and_bad_rules_are_all_reported() {
    let toml_str = r#"
[[machines]]
id = 1
name = "A"
endpoint = "http://a"

[[machines]]
id = 1
name = "B"
endpoint = "http://b"

[[thresholds]]
id = 7
machine_id = 1
metric_key = "x"
kind = "range"

[[thresholds]]
id = 7
machine_id = 1
metric_key = "y"
kind = "avg"
allowed_percent = 5.0
"#;
    match PlantConfig::from_toml_str(toml_str) {
        Err(ConfigError::Validation(errors)) => {
            assert!(errors.len() >= 3, "{errors:?}");
            assert!(errors.iter().any(|e| e.contains("machine")));
            assert!(errors.iter().any(|e| e.contains("min or max")));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn rule_kinds_deserialize_from_kind_tag() {
    let toml_str = r#"
[[machines]]
id = 1
name = "A"
endpoint = "http://a"

[[thresholds]]
id = 1
machine_id = 1
metric_key = "motor_fault"
kind = "boolean"
trigger_value = true
message = "Motor fault"

[[thresholds]]
id = 2
machine_id = 1
metric_key = "nang_suatkg_h"
kind = "avg"
allowed_percent = 15.0
"#;
    let config = PlantConfig::from_toml_str(toml_str).unwrap();
    assert!(matches!(
        config.thresholds[0].condition,
        RuleCondition::Boolean {
            trigger_value: true,
            ..
        }
    ));
    assert_eq!(
        config.thresholds[1].condition,
        RuleCondition::Avg {
            allowed_percent: 15.0
        }
    );
}

// ============================================================================
// Operational Sanity Checks
// ============================================================================

#[test]
fn short_avg_window_warns() {
    let mut config = PlantConfig::default();
    config.ingestion.interval_secs = 600;
    let warnings = validate_operational_ranges(&config);
    assert!(warnings
        .iter()
        .any(|w| w.field == "alerts.avg_window_minutes"));
}

#[test]
fn product_without_catalogue_data_warns() {
    let toml_str = r#"
[[products]]
code = "X"
name = "20 PN10 PPR"
"#;
    let config = PlantConfig::from_toml_str(toml_str).unwrap();
    let warnings = validate_operational_ranges(&config);
    assert_eq!(warnings.len(), 2, "{warnings:?}");
}
