//! Reading types: MetricValue, Snapshot, Reading

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Metric Values
// ============================================================================

/// A single sensor/tag value addressed by its canonical snake_case name.
///
/// PLC watch tables mix booleans (lamp icons), numbers (comma decimals) and
/// free text (dates, shift labels), so readings keep the tag as reported and
/// rules coerce it on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum MetricValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// Numeric view used by range/percent/avg rules and OEE averages.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(x) if x.is_finite() => Some(*x),
            MetricValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Boolean view used by boolean rules.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetricValue::Bool(b) => Some(*b),
            MetricValue::Number(x) => Some(*x != 0.0),
            _ => None,
        }
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Null => write!(f, "null"),
            MetricValue::Bool(b) => write!(f, "{b}"),
            MetricValue::Number(x) => write!(f, "{}", display_number(*x)),
            MetricValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(x: f64) -> Self {
        MetricValue::Number(x)
    }
}

impl From<bool> for MetricValue {
    fn from(b: bool) -> Self {
        MetricValue::Bool(b)
    }
}

impl From<&str> for MetricValue {
    fn from(s: &str) -> Self {
        MetricValue::Text(s.to_string())
    }
}

/// Format a float for alert messages: at most 3 decimals, trailing zeros trimmed.
///
/// `95.0 -> "95"`, `5.299999999 -> "5.3"`, `19.125 -> "19.125"`.
pub fn display_number(x: f64) -> String {
    if !x.is_finite() {
        return x.to_string();
    }
    let s = format!("{x:.3}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

// ============================================================================
// Snapshot (raw machine state from a source)
// ============================================================================

/// Raw machine state for one poll, keys already normalized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub values: BTreeMap<String, MetricValue>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<MetricValue>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: MetricValue) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&MetricValue> {
        self.values.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

// ============================================================================
// Reading (persisted snapshot)
// ============================================================================

/// One persisted crawl cycle for one machine.
///
/// `timestamp` is the wall-clock instant the reading was recorded; the
/// production date and shift are the values the PLC reported, which can
/// differ around midnight for the night shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: u64,
    pub machine_id: u32,
    pub timestamp: DateTime<Utc>,
    pub production_date: NaiveDate,
    pub shift_label: String,
    /// Cumulative runtime counter maintained by the PLC (minutes since shift start)
    pub runtime_minutes: Option<f64>,
    pub metrics: BTreeMap<String, MetricValue>,
}

impl Reading {
    pub fn metric(&self, key: &str) -> Option<&MetricValue> {
        self.metrics.get(key)
    }

    pub fn metric_f64(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).and_then(MetricValue::as_f64)
    }
}

/// A reading that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub machine_id: u32,
    pub timestamp: DateTime<Utc>,
    pub production_date: NaiveDate,
    pub shift_label: String,
    pub runtime_minutes: Option<f64>,
    pub metrics: BTreeMap<String, MetricValue>,
}

impl NewReading {
    pub fn into_reading(self, id: u64) -> Reading {
        Reading {
            id,
            machine_id: self.machine_id,
            timestamp: self.timestamp,
            production_date: self.production_date,
            shift_label: self.shift_label,
            runtime_minutes: self.runtime_minutes,
            metrics: self.metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_view() {
        assert_eq!(MetricValue::Number(4.5).as_f64(), Some(4.5));
        assert_eq!(MetricValue::Bool(true).as_f64(), Some(1.0));
        assert_eq!(MetricValue::Text("CA1".into()).as_f64(), None);
        assert_eq!(MetricValue::Null.as_f64(), None);
        assert_eq!(MetricValue::Number(f64::NAN).as_f64(), None);
    }

    #[test]
    fn test_bool_view() {
        assert_eq!(MetricValue::Number(0.0).as_bool(), Some(false));
        assert_eq!(MetricValue::Number(2.0).as_bool(), Some(true));
        assert_eq!(MetricValue::Text("true".into()).as_bool(), None);
    }

    #[test]
    fn test_display_number_trims() {
        assert_eq!(display_number(95.0), "95");
        assert_eq!(display_number(95.3 - 90.0), "5.3");
        assert_eq!(display_number(19.125), "19.125");
        assert_eq!(display_number(-0.0001), "0");
    }

    #[test]
    fn test_untagged_json_shapes() {
        let snap: Snapshot = serde_json::from_str(
            r#"{"values": {"a": 1.5, "b": true, "c": "CA2", "d": null}}"#,
        )
        .unwrap();
        assert_eq!(snap.get("a"), Some(&MetricValue::Number(1.5)));
        assert_eq!(snap.get("b"), Some(&MetricValue::Bool(true)));
        assert_eq!(snap.get("c"), Some(&MetricValue::Text("CA2".into())));
        assert_eq!(snap.get("d"), Some(&MetricValue::Null));
    }
}
