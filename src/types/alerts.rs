//! Alert history and open-alert summaries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MetricValue, ThresholdSnapshot};

/// Alert severity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Danger,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "WARNING"),
            Severity::Danger => write!(f, "DANGER"),
        }
    }
}

/// Lifecycle of an alert summary
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    /// Open; further violations of the same metric increment it
    #[default]
    New,
    /// Closed by an operator; the next violation opens a fresh summary
    Acknowledged,
}

/// One rule violation on one reading. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: u64,
    pub machine_id: u32,
    pub reading_id: u64,
    pub metric_key: String,
    pub value: MetricValue,
    pub severity: Severity,
    pub message: String,
    pub threshold: ThresholdSnapshot,
    pub occurred_at: DateTime<Utc>,
}

/// Input to `AlertStore::record_alert`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub machine_id: u32,
    pub reading_id: u64,
    pub metric_key: String,
    pub value: MetricValue,
    pub severity: Severity,
    pub message: String,
    pub threshold: ThresholdSnapshot,
}

impl NewAlert {
    pub fn into_event(self, id: u64, occurred_at: DateTime<Utc>) -> AlertEvent {
        AlertEvent {
            id,
            machine_id: self.machine_id,
            reading_id: self.reading_id,
            metric_key: self.metric_key,
            value: self.value,
            severity: self.severity,
            message: self.message,
            threshold: self.threshold,
            occurred_at,
        }
    }
}

/// Deduplicated view of an alerting metric.
///
/// At most one `New` summary exists per `(machine_id, metric_key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub id: u64,
    pub machine_id: u32,
    pub metric_key: String,
    pub status: AlertStatus,
    pub current_value: MetricValue,
    pub message: String,
    pub severity: Severity,
    pub occurrence_count: u64,
    pub first_occurred_at: DateTime<Utc>,
    pub last_occurred_at: DateTime<Utc>,
    pub last_reading_id: u64,
    pub threshold: ThresholdSnapshot,
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl AlertSummary {
    /// Open a fresh summary from the first event.
    pub fn open(id: u64, event: &AlertEvent) -> Self {
        Self {
            id,
            machine_id: event.machine_id,
            metric_key: event.metric_key.clone(),
            status: AlertStatus::New,
            current_value: event.value.clone(),
            message: event.message.clone(),
            severity: event.severity,
            occurrence_count: 1,
            first_occurred_at: event.occurred_at,
            last_occurred_at: event.occurred_at,
            last_reading_id: event.reading_id,
            threshold: event.threshold,
            acknowledged_at: None,
        }
    }

    /// Fold a repeat occurrence into an open summary.
    pub fn register(&mut self, event: &AlertEvent) {
        self.occurrence_count += 1;
        self.current_value = event.value.clone();
        self.last_occurred_at = event.occurred_at;
        self.last_reading_id = event.reading_id;
        if self.message != event.message {
            self.message.clone_from(&event.message);
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == AlertStatus::New
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(reading_id: u64, value: f64, message: &str, minute: u32) -> AlertEvent {
        AlertEvent {
            id: reading_id,
            machine_id: 1,
            reading_id,
            metric_key: "ap_luc_nhua".to_string(),
            value: MetricValue::Number(value),
            severity: Severity::Danger,
            message: message.to_string(),
            threshold: ThresholdSnapshot {
                min: None,
                max: Some(90.0),
            },
            occurred_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, minute, 0).unwrap(),
        }
    }

    #[test]
    fn test_register_updates_latest_fields() {
        let first = event(1, 95.0, "value 95 exceeds max 90 by 5", 0);
        let mut summary = AlertSummary::open(10, &first);
        assert_eq!(summary.occurrence_count, 1);

        let second = event(2, 97.0, "value 97 exceeds max 90 by 7", 5);
        summary.register(&second);

        assert_eq!(summary.occurrence_count, 2);
        assert_eq!(summary.current_value, MetricValue::Number(97.0));
        assert_eq!(summary.message, "value 97 exceeds max 90 by 7");
        assert_eq!(summary.first_occurred_at, first.occurred_at);
        assert_eq!(summary.last_occurred_at, second.occurred_at);
        assert_eq!(summary.last_reading_id, 2);
        assert!(summary.is_open());
    }
}
