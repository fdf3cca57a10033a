//! Threshold Alerting Tests
//!
//! Rules loaded from TOML, evaluated against stored readings, with the
//! resulting alert history and open summaries checked in sled.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

use plc_oee::config::PlantConfig;
use plc_oee::types::{AlertStatus, MetricValue, NewReading, Reading, Severity};
use plc_oee::{Storage, ThresholdEvaluator, ThresholdRegistry};

const RULES: &str = r#"
[[machines]]
id = 1
name = "Line 1"
endpoint = "http://10.0.0.11/awp/watch.html"

[[thresholds]]
id = 1
machine_id = 1
name = "Melt pressure"
metric_key = "ap_luc_nhua"
kind = "range"
min = 10.0
max = 90.0

[[thresholds]]
id = 2
machine_id = 1
metric_key = "nhiet_do_vung_1"
kind = "percent"
base_value = 100.0
allowed_percent = 20.0

[[thresholds]]
id = 3
machine_id = 1
metric_key = "nang_suatkg_h"
kind = "avg"
allowed_percent = 10.0

[[thresholds]]
id = 4
machine_id = 1
metric_key = "motor_fault"
kind = "boolean"
trigger_value = true
message = "Motor fault lamp on"
"#;

struct Harness {
    _dir: TempDir,
    storage: Storage,
    evaluator: ThresholdEvaluator,
    start: DateTime<Utc>,
}

impl Harness {
    fn new() -> Self {
        let config = PlantConfig::from_toml_str(RULES).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("db")).unwrap();
        let evaluator = ThresholdEvaluator::new(
            Arc::new(ThresholdRegistry::from_rules(config.thresholds)),
            storage.readings().clone(),
            storage.alerts().clone(),
            Duration::minutes(config.alerts.avg_window_minutes),
        );
        Self {
            _dir: dir,
            storage,
            evaluator,
            start: Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap(),
        }
    }

    /// Store a reading `minute` minutes after start and evaluate it.
    fn feed(&self, minute: i64, metrics: &[(&str, MetricValue)]) -> (Reading, Vec<plc_oee::AlertEvent>) {
        let now = self.start + Duration::minutes(minute);
        let reading = self
            .storage
            .readings()
            .append(NewReading {
                machine_id: 1,
                timestamp: now,
                production_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                shift_label: "CA1".to_string(),
                runtime_minutes: Some(minute as f64),
                metrics: metrics
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect::<BTreeMap<_, _>>(),
            })
            .unwrap();
        let alerts = self.evaluator.evaluate(1, &reading, now);
        (reading, alerts)
    }
}

#[test]
fn range_violation_records_event_and_summary() {
    let h = Harness::new();
    let (reading, alerts) = h.feed(0, &[("ap_luc_nhua", MetricValue::Number(95.0))]);

    assert_eq!(alerts.len(), 1);
    let event = &alerts[0];
    assert_eq!(event.reading_id, reading.id);
    assert_eq!(event.severity, Severity::Danger);
    assert!(event.message.contains("95"), "{}", event.message);
    assert!(event.message.contains("90"), "{}", event.message);
    assert_eq!(event.threshold.max, Some(90.0));

    let open = h.storage.alerts().open_summaries(Some(1)).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].occurrence_count, 1);
    assert_eq!(open[0].status, AlertStatus::New);
}

#[test]
fn range_bounds_are_strict() {
    let h = Harness::new();
    for (minute, value) in [(0, 90.0), (1, 10.0), (2, 50.0)] {
        let (_, alerts) = h.feed(minute, &[("ap_luc_nhua", MetricValue::Number(value))]);
        assert!(alerts.is_empty(), "value {value} should not fire");
    }
    let (_, below) = h.feed(3, &[("ap_luc_nhua", MetricValue::Number(9.5))]);
    assert_eq!(below.len(), 1);
    assert!(below[0].message.contains("below min 10"));
}

#[test]
fn repeated_violations_increment_one_summary() {
    let h = Harness::new();
    for (minute, value) in [(0, 95.0), (1, 97.0), (2, 99.0)] {
        h.feed(minute, &[("ap_luc_nhua", MetricValue::Number(value))]);
    }

    let open = h.storage.alerts().open_summaries(None).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].occurrence_count, 3);
    assert_eq!(open[0].current_value, MetricValue::Number(99.0));
    assert_eq!(h.storage.alerts().event_count(), 3);
}

#[test]
fn acknowledged_summary_is_not_reused() {
    let h = Harness::new();
    h.feed(0, &[("ap_luc_nhua", MetricValue::Number(95.0))]);
    let first = h.storage.alerts().open_summaries(None).unwrap().remove(0);

    let acked = h.storage.alerts().acknowledge(first.id, h.start).unwrap();
    assert_eq!(acked.status, AlertStatus::Acknowledged);
    assert!(h.storage.alerts().open_summaries(None).unwrap().is_empty());

    h.feed(1, &[("ap_luc_nhua", MetricValue::Number(96.0))]);
    let open = h.storage.alerts().open_summaries(None).unwrap();
    assert_eq!(open.len(), 1);
    assert_ne!(open[0].id, first.id);
    assert_eq!(open[0].occurrence_count, 1);

    let old = h.storage.alerts().summary(first.id).unwrap().unwrap();
    assert_eq!(old.occurrence_count, 1);
}

#[test]
fn percent_rule_boundary() {
    let h = Harness::new();
    let (_, at_limit) = h.feed(0, &[("nhiet_do_vung_1", MetricValue::Number(119.0))]);
    assert!(at_limit.is_empty());
    let (_, over) = h.feed(1, &[("nhiet_do_vung_1", MetricValue::Number(125.0))]);
    assert_eq!(over.len(), 1);
    assert_eq!(over[0].severity, Severity::Danger);
}

#[test]
fn avg_rule_uses_trailing_window() {
    let h = Harness::new();
    for minute in 0..3 {
        let (_, alerts) = h.feed(minute, &[("nang_suatkg_h", MetricValue::Number(100.0))]);
        assert!(alerts.is_empty());
    }
    // window mean (3 × 100 + 130) / 4 = 107.5, deviation about 20.9 %
    let (_, alerts) = h.feed(3, &[("nang_suatkg_h", MetricValue::Number(130.0))]);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, Severity::Warning);
}

#[test]
fn avg_window_forgets_old_readings() {
    let h = Harness::new();
    h.feed(0, &[("nang_suatkg_h", MetricValue::Number(10.0))]);
    // 30 minutes later the 10 kg/h reading is outside the 10 minute window
    let (_, alerts) = h.feed(30, &[("nang_suatkg_h", MetricValue::Number(100.0))]);
    assert!(alerts.is_empty());
}

#[test]
fn boolean_rule_uses_configured_message() {
    let h = Harness::new();
    let (_, off) = h.feed(0, &[("motor_fault", MetricValue::Bool(false))]);
    assert!(off.is_empty());
    let (_, on) = h.feed(1, &[("motor_fault", MetricValue::Bool(true))]);
    assert_eq!(on.len(), 1);
    assert_eq!(on[0].message, "Motor fault lamp on");
}

#[test]
fn missing_and_null_metrics_are_skipped() {
    let h = Harness::new();
    let (_, alerts) = h.feed(
        0,
        &[
            ("ap_luc_nhua", MetricValue::Null),
            ("nhiet_do_vung_1", MetricValue::Text("n/a".into())),
        ],
    );
    assert!(alerts.is_empty());
    assert_eq!(h.storage.alerts().event_count(), 0);
}

#[test]
fn machines_without_rules_produce_nothing() {
    let h = Harness::new();
    let now = h.start;
    let reading = h
        .storage
        .readings()
        .append(NewReading {
            machine_id: 2,
            timestamp: now,
            production_date: now.date_naive(),
            shift_label: "CA1".to_string(),
            runtime_minutes: None,
            metrics: BTreeMap::from([("ap_luc_nhua".to_string(), MetricValue::Number(500.0))]),
        })
        .unwrap();
    assert!(h.evaluator.evaluate(2, &reading, now).is_empty());
}
